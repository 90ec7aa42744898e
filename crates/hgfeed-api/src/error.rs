use thiserror::Error;

/// Top-level error type for the `hgfeed-api` crate.
///
/// Covers transport failures, the vendor's `{code, msg, data}` envelope,
/// and body decoding. `hgfeed-core` translates these into its own taxonomy;
/// nothing above the core ever sees one of these directly.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The cloud rejected the bearer token (HTTP 401 or envelope code 401).
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A configured header value cannot be sent on the wire.
    #[error("Invalid value for header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    // ── Vendor API ──────────────────────────────────────────────────
    /// Non-success HTTP status that did not carry a usable envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The envelope carried a `code` other than 200.
    #[error("HGSmart API error (code {code}): {message}")]
    Vendor { code: i64, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the server refused the access token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Vendor { code, .. } => (500..600).contains(code),
            _ => false,
        }
    }

    /// The server-provided reason, when the server provided one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { message }
            | Self::Http { message, .. }
            | Self::Vendor { message, .. } => Some(message),
            _ => None,
        }
    }
}
