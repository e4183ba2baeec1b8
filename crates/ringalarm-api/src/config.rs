// ── Runtime session configuration ──
//
// These types describe *how* to talk to the Ring cloud. They carry
// credential data and connection tuning, but never touch disk.
// `ringalarm-config` (or any other consumer) builds a `SessionConfig`
// and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// API version sent with every REST call unless overridden.
pub const DEFAULT_API_VERSION: u32 = 11;

/// User agent the official Android app presents.
pub const DEFAULT_USER_AGENT: &str = "android:com.ringapp:2.0.67(423)";

/// Fixed hosts the client talks to. Overridable so tests can point
/// every channel at local mock servers.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Prefix for relative REST paths (e.g. `/ring_devices`).
    pub api_base: Url,
    /// OAuth password / refresh grant endpoint.
    pub oauth_token: Url,
    /// Connection-ticket endpoint for the alarm websocket.
    pub connections: Url,
    /// `wss` in production, `ws` against a local test server.
    pub socket_scheme: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: Url::parse("https://api.ring.com/clients_api").expect("static URL"),
            oauth_token: Url::parse("https://oauth.ring.com/oauth/token").expect("static URL"),
            connections: Url::parse("https://app.ring.com/api/v1/rs/connections").expect("static URL"),
            socket_scheme: "wss".into(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at a single base URL, keeping production paths.
    ///
    /// Used against mock servers: `{base}/clients_api`, `{base}/oauth/token`,
    /// `{base}/api/v1/rs/connections`, plain `ws` sockets.
    pub fn rooted_at(base: &Url) -> Result<Self, Error> {
        let root = base.as_str().trim_end_matches('/');
        Ok(Self {
            api_base: Url::parse(&format!("{root}/clients_api"))?,
            oauth_token: Url::parse(&format!("{root}/oauth/token"))?,
            connections: Url::parse(&format!("{root}/api/v1/rs/connections"))?,
            socket_scheme: "ws".into(),
        })
    }
}

/// Exponential backoff configuration for alarm socket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the second reconnection attempt. Default: 1s.
    /// The first attempt after a loss is immediate.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry until the connection is closed or the client shuts down.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Everything a [`Session`](crate::Session) needs to authenticate and talk
/// to both channels.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub username: String,
    pub password: SecretString,
    /// How many times a 401 may trigger re-authentication and a re-issue.
    pub retries: u32,
    /// Hard budget for one REST exchange (request + full body).
    pub timeout: Duration,
    pub user_agent: String,
    pub api_version: u32,
    pub endpoints: Endpoints,
    pub reconnect: ReconnectConfig,
    /// Budget for opening the socket and receiving the Socket.IO connect packet.
    pub handshake_timeout: Duration,
    /// Pause before invalidating the token and re-issuing after a 401.
    pub retry_delay: Duration,
}

impl SessionConfig {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            retries: 0,
            timeout: Duration::from_secs(5 * 60),
            user_agent: DEFAULT_USER_AGENT.into(),
            api_version: DEFAULT_API_VERSION,
            endpoints: Endpoints::default(),
            reconnect: ReconnectConfig::default(),
            handshake_timeout: Duration::from_secs(20),
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Reject configurations that can never authenticate.
    pub fn validate(&self) -> Result<(), Error> {
        if self.username.trim().is_empty() {
            return Err(Error::Config("username is required".into()));
        }
        if self.password.expose_secret().is_empty() {
            return Err(Error::Config("password is required".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_mobile_app() {
        let config = SessionConfig::new("a@b.c", SecretString::from("pw"));
        assert_eq!(config.retries, 0);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.api_version, 11);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.endpoints.socket_scheme, "wss");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let no_user = SessionConfig::new("  ", SecretString::from("pw"));
        assert!(matches!(no_user.validate(), Err(Error::Config(_))));

        let no_password = SessionConfig::new("a@b.c", SecretString::from(""));
        assert!(matches!(no_password.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rooted_endpoints_keep_paths() {
        let base = Url::parse("http://127.0.0.1:9000/").unwrap();
        let endpoints = Endpoints::rooted_at(&base).unwrap();
        assert_eq!(endpoints.api_base.as_str(), "http://127.0.0.1:9000/clients_api");
        assert_eq!(endpoints.oauth_token.path(), "/oauth/token");
        assert_eq!(endpoints.connections.path(), "/api/v1/rs/connections");
        assert_eq!(endpoints.socket_scheme, "ws");
    }
}
