// Shared transport configuration for building the reqwest::Client.
//
// The session owns one client for both the OAuth endpoint and the REST
// API. Per-request budgets are enforced by the dispatcher, so only the
// connect phase gets a client-level timeout here.

use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::Error;

/// Upper bound on TCP + TLS setup, independent of the request budget.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a `reqwest::Client` carrying the configured user agent.
pub fn build_client(config: &SessionConfig) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(CONNECT_TIMEOUT.min(config.timeout))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}
