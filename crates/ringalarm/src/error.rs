//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ringalarm_api::Error as RingError;
use ringalarm_config::ConfigError;

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
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the alarm socket for location {location}")]
    #[diagnostic(
        code(ringalarm::connection_failed),
        help("The station may be offline. Retry, or run with -vv to see the socket handshake.")
    )]
    ConnectionFailed {
        location: String,
        #[source]
        source: RingError,
    },

    #[error("Could not reach the Ring API")]
    #[diagnostic(code(ringalarm::transport), help("Check your network connection."))]
    Transport {
        #[source]
        source: RingError,
    },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(ringalarm::auth_failed),
        help(
            "Verify your Ring account credentials.\n\
             Run: ringalarm config set-password --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(ringalarm::no_credentials),
        help(
            "Configure a profile with: ringalarm config init --username <email>\n\
             Or set RINGALARM_USERNAME and RINGALARM_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(ringalarm::not_found),
        help("Run: ringalarm {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(ringalarm::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ringalarm::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration error: {0}")]
    #[diagnostic(code(ringalarm::config))]
    Config(String),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(ringalarm::timeout),
        help("Increase the budget with --timeout.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(ringalarm::json), help("The body must be a JSON object."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Transport { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Library error mapping ────────────────────────────────────────────

impl From<RingError> for CliError {
    fn from(err: RingError) -> Self {
        match err {
            RingError::Config(message) => Self::Config(message),
            RingError::Validation { field, reason } => Self::Validation {
                field: field.into(),
                reason,
            },
            RingError::Auth(e) => Self::AuthFailed {
                message: e.to_string(),
            },
            RingError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            RingError::HttpStatus { status: 401, .. } => Self::AuthFailed {
                message: "the API rejected the access token".into(),
            },
            RingError::HttpStatus { status, body } => Self::ApiError {
                code: status.to_string(),
                message: body,
            },
            RingError::Api { status, message } => Self::ApiError {
                code: status.map_or_else(|| "error".into(), |s| s.to_string()),
                message,
            },
            RingError::ConnectFailed { ref location, .. }
            | RingError::ConnectionLost { ref location, .. }
            | RingError::ConnectionClosed { ref location } => Self::ConnectionFailed {
                location: location.clone(),
                source: err,
            },
            other => Self::Transport { source: other },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_errors_map_to_exit_codes() {
        let auth: CliError = RingError::HttpStatus {
            status: 401,
            body: String::new(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let lost: CliError = RingError::ConnectionLost {
            location: "loc".into(),
            reason: "gone".into(),
        }
        .into();
        assert_eq!(lost.exit_code(), exit_code::CONNECTION);

        let invalid: CliError = RingError::Validation {
            field: "alarm_panel_id",
            reason: "needs to be a UUID".into(),
        }
        .into();
        assert_eq!(invalid.exit_code(), exit_code::USAGE);

        let missing: CliError = ConfigError::NoCredentials {
            profile: "home".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::AUTH);
    }
}
