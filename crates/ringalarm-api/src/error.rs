use thiserror::Error;

/// Failure of a single token acquisition attempt.
///
/// `Clone` so one outcome can be handed to every caller that queued
/// behind the same in-flight attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached or the exchange broke off.
    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    /// The token endpoint answered without both an access and a refresh token.
    #[error("token endpoint returned no usable token (HTTP {status}): {message}")]
    Protocol { status: u16, message: String },
}

/// Top-level error type for the `ringalarm-api` crate.
///
/// Covers every failure mode across both channels: configuration and
/// input validation, OAuth, REST transport, and the alarm websocket.
#[derive(Debug, Error)]
pub enum Error {
    // ── Construction / input ────────────────────────────────────────
    /// Missing or unusable session configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied argument rejected before any network activity.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    // ── Authentication ──────────────────────────────────────────────
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    // ── REST transport ──────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-2xx HTTP status.
    #[error("API returned Status Code {status}")]
    HttpStatus { status: u16, body: String },

    /// 2xx response whose body carried an `error` envelope.
    #[error("API error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    /// Request exceeded the configured budget.
    #[error("An API Timeout Occurred after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Alarm websocket ─────────────────────────────────────────────
    /// Ticket fetch or socket handshake failed for a location.
    #[error("alarm connection to {location} failed: {reason}")]
    ConnectFailed { location: String, reason: String },

    /// The location's socket dropped while the operation was outstanding.
    #[error("alarm connection to {location} lost: {reason}")]
    ConnectionLost { location: String, reason: String },

    /// The location's socket was closed by the caller.
    #[error("alarm connection to {location} was closed")]
    ConnectionClosed { location: String },

    /// Malformed socket frame or handshake data.
    #[error("alarm protocol error: {0}")]
    Protocol(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Numeric HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Api { status, .. } => *status,
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` for the one status the dispatcher retries on.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    /// Returns `true` if the alarm socket went away under the caller.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost { .. } | Self::ConnectionClosed { .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Auth(AuthError::Transport(_))
            | Self::Timeout { .. }
            | Self::ConnectFailed { .. }
            | Self::ConnectionLost { .. } => true,
            _ => false,
        }
    }
}
