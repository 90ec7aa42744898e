// ── Core error types ──
//
// The taxonomy hosts program against. Nothing above this crate sees an
// HTTP status or a JSON parse failure: `From<hgfeed_api::Error>` does the
// boundary translation, and the auth and device-call layers refine it
// further where they know more (login vs. refresh vs. device command).

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    /// The cloud rejected the username/password. The user must retry.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// The refresh token is dead; a fresh username/password login is needed.
    #[error("Re-authentication required -- log in again")]
    ReauthenticationRequired,

    /// No credential has been established for this session.
    #[error("Not authenticated")]
    NotAuthenticated,

    // ── Transient ────────────────────────────────────────────────────
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// Retries were exhausted for a device call.
    #[error("Device {device_id} unreachable: {reason}")]
    DeviceUnreachable { device_id: String, reason: String },

    #[error("Operation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Rejections ───────────────────────────────────────────────────
    /// The cloud refused the command; `reason` is its message verbatim.
    #[error("Command rejected: {reason}")]
    CommandRejected { reason: String },

    /// Local validation failed before any network call.
    #[error("Validation failed: {message}")]
    ValidationError { message: String },

    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    // ── Configuration / internal ─────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later could succeed without
    /// user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::DeviceUnreachable { .. } | Self::Timeout { .. }
        )
    }

    /// Whether the user has to enter a password again.
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            Self::ReauthenticationRequired | Self::NotAuthenticated
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hgfeed_api::Error> for CoreError {
    fn from(err: hgfeed_api::Error) -> Self {
        use hgfeed_api::Error as Api;

        if err.is_transient() {
            return CoreError::NetworkError {
                message: err.to_string(),
            };
        }

        match err {
            Api::Unauthorized { message } => CoreError::CommandRejected {
                reason: format!("unauthorized: {message}"),
            },
            Api::Vendor { message, .. } => CoreError::CommandRejected { reason: message },
            Api::Http { status, message } => CoreError::CommandRejected {
                reason: format!("HTTP {status}: {message}"),
            },
            Api::Transport(e) => CoreError::NetworkError {
                message: e.to_string(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            Api::Tls(message) => CoreError::Config { message },
            Api::InvalidHeader { name, value } => CoreError::Config {
                message: format!("invalid value for header {name}: {value:?}"),
            },
            Api::Deserialization { message, .. } => {
                CoreError::Internal(format!("unexpected response from HGSmart cloud: {message}"))
            }
        }
    }
}
