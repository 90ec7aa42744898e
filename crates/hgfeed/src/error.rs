//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hgfeed_config::ConfigError;
use hgfeed_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Not logged in (profile '{profile}')")]
    #[diagnostic(
        code(hgfeed::not_logged_in),
        help("Run: hgfeed login --profile {profile}")
    )]
    NotLoggedIn { profile: String },

    #[error("Login rejected: {message}")]
    #[diagnostic(
        code(hgfeed::auth_failed),
        help("Check the e-mail and password you use in the HGSmart app.")
    )]
    AuthFailed { message: String },

    #[error("Session expired for profile '{profile}'")]
    #[diagnostic(
        code(hgfeed::reauth_required),
        help(
            "The stored refresh token is no longer accepted.\n\
             Run: hgfeed login --profile {profile}"
        )
    )]
    ReauthRequired { profile: String },

    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Could not reach the HGSmart cloud: {message}")]
    #[diagnostic(
        code(hgfeed::connection_failed),
        help("Check your network connection and try again.")
    )]
    ConnectionFailed { message: String },

    #[error("Feeder {device} is unreachable: {reason}")]
    #[diagnostic(
        code(hgfeed::device_unreachable),
        help("The cloud could not reach the feeder. Check that it is powered and on Wi-Fi.")
    )]
    DeviceUnreachable { device: String, reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(hgfeed::timeout),
        help("Increase the timeout with --timeout or try again later.")
    )]
    Timeout { seconds: u64 },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hgfeed::not_found),
        help("Run: hgfeed {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Rejected by the HGSmart cloud: {reason}")]
    #[diagnostic(code(hgfeed::rejected))]
    Rejected { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hgfeed::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(hgfeed::config))]
    Config(#[from] ConfigError),

    // ── Other ────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(hgfeed::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotLoggedIn { .. } | Self::AuthFailed { .. } | Self::ReauthRequired { .. } => {
                exit_code::AUTH
            }
            Self::ConnectionFailed { .. } | Self::DeviceUnreachable { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config(ConfigError::UnknownProfile { .. }) => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }

    /// Translate a core error, naming `profile` in login hints.
    pub fn from_core(err: CoreError, profile: &str) -> Self {
        match err {
            CoreError::InvalidCredentials { message } => Self::AuthFailed { message },
            CoreError::ReauthenticationRequired => Self::ReauthRequired {
                profile: profile.into(),
            },
            CoreError::NotAuthenticated => Self::NotLoggedIn {
                profile: profile.into(),
            },
            other => other.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCredentials { message } => CliError::AuthFailed { message },
            CoreError::ReauthenticationRequired => CliError::ReauthRequired {
                profile: "current".into(),
            },
            CoreError::NotAuthenticated => CliError::NotLoggedIn {
                profile: "current".into(),
            },
            CoreError::NetworkError { message } => CliError::ConnectionFailed { message },
            CoreError::DeviceUnreachable { device_id, reason } => CliError::DeviceUnreachable {
                device: device_id,
                reason,
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::CommandRejected { reason } => CliError::Rejected { reason },
            CoreError::ValidationError { message } => CliError::Validation {
                field: "command".into(),
                reason: message,
            },
            CoreError::DeviceNotFound { device_id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: device_id,
                list_command: "devices".into(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let reauth = CliError::from_core(CoreError::ReauthenticationRequired, "home");
        assert_eq!(reauth.exit_code(), exit_code::AUTH);
        assert!(reauth.to_string().contains("home"));

        let unreachable: CliError = CoreError::DeviceUnreachable {
            device_id: "d".into(),
            reason: "503".into(),
        }
        .into();
        assert_eq!(unreachable.exit_code(), exit_code::CONNECTION);

        let invalid: CliError = CoreError::ValidationError {
            message: "portions".into(),
        }
        .into();
        assert_eq!(invalid.exit_code(), exit_code::USAGE);

        let timeout: CliError = CoreError::Timeout { timeout_secs: 10 }.into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);
    }
}
