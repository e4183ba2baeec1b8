// Authenticated REST dispatcher
//
// Resolves a token before every call, enforces the request budget, maps
// HTTP and envelope failures into `Error`, and re-issues once per unit of
// retry budget when the API answers 401.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace, warn};
use url::Url;

use crate::body::Body;
use crate::error::Error;
use crate::session::Session;

/// One REST call: method, absolute URL or path under the API base,
/// extra query parameters, and an optional form body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            form: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn form_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }
}

/// Decoded response plus the transport-level details.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Session {
    /// Issue an authenticated request.
    ///
    /// A 401 consumes one unit of the retry budget: after a short pause the
    /// token is invalidated, a fresh one is forced, and the request is sent
    /// again. Any other outcome resets the budget.
    pub async fn request(self: &Arc<Self>, request: &ApiRequest) -> Result<ApiResponse, Error> {
        loop {
            let token = self.ensure_token(false).await?;
            let outcome = self.dispatch(request, &token).await;

            match outcome {
                Err(e) if e.is_unauthorized() && self.take_retry() => {
                    let attempt = self.retry_counter.load(Ordering::Relaxed);
                    warn!(attempt, path = %request.path, "auth failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                    self.invalidate_token();
                    self.ensure_token(true).await?;
                }
                outcome => {
                    self.retry_counter.store(0, Ordering::Relaxed);
                    return outcome;
                }
            }
        }
    }

    fn take_retry(&self) -> bool {
        let budget = self.config.retries;
        self.retry_counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                (used < budget).then_some(used + 1)
            })
            .is_ok()
    }

    pub(crate) fn resolve_url(&self, path: &str) -> Result<Url, Error> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        let base = self.config.endpoints.api_base.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn dispatch(&self, request: &ApiRequest, token: &SecretString) -> Result<ApiResponse, Error> {
        let url = self.resolve_url(&request.path)?;
        let api_version = self.config.api_version.to_string();
        debug!(method = %request.method, %url, "fetch");

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .query(&[("api_version", api_version.as_str())])
            .query(&request.query)
            .bearer_auth(token.expose_secret());

        if let Some(form) = &request.form {
            let mut form = form.clone();
            if !form.iter().any(|(k, _)| k == "api_version") {
                form.push(("api_version".into(), api_version.clone()));
            }
            trace!(fields = form.len(), "fetch-post");
            builder = builder.form(&form);
        }

        let exchange = async {
            let resp = builder.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let text = resp.text().await?;
            Ok::<_, reqwest::Error>((status, headers, text))
        };

        // Dropping the exchange on timeout discards anything that arrives late.
        let (status, headers, text) = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            })??;

        trace!(status = status.as_u16(), bytes = text.len(), "fetch-raw-data");
        let body = Body::decode(&text);

        if status.is_client_error() || status.is_server_error() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }

        if let Some((status, message)) = body.error_envelope() {
            return Err(Error::Api { status, message });
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::SessionConfig;

    #[tokio::test]
    async fn relative_paths_join_the_api_base() {
        let config = SessionConfig::new("u", SecretString::from("p"));
        let session = Session::start(config, Arc::new(MemoryCache::default())).unwrap();

        let url = session.resolve_url("/ring_devices").unwrap();
        assert_eq!(url.as_str(), "https://api.ring.com/clients_api/ring_devices");

        let absolute = session
            .resolve_url("https://app.ring.com/api/v1/rs/connections")
            .unwrap();
        assert_eq!(absolute.host_str(), Some("app.ring.com"));
    }

    #[test]
    fn form_fields_accumulate() {
        let request = ApiRequest::post("/x")
            .form_field("accountId", "loc")
            .query("a", "b");
        assert_eq!(request.form.unwrap(), vec![(String::from("accountId"), String::from("loc"))]);
        assert_eq!(request.query, vec![(String::from("a"), String::from("b"))]);
    }
}
