// OAuth token acquisition
//
// At most one acquisition is in flight per session. Every caller that
// needs a token while it runs parks in `AuthState::waiters` and receives
// the same outcome. The acquisition itself runs on a spawned task so a
// dropped caller can never strand the others.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::cache::CacheRecord;
use crate::error::{AuthError, Error};
use crate::session::Session;

/// OAuth client the official Android app registers as.
const CLIENT_ID: &str = "ring_official_android";
const SCOPE: &str = "client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    Password,
    Refresh,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

struct TokenPair {
    access: SecretString,
    refresh: SecretString,
}

impl Session {
    /// Return a usable access token, acquiring one if needed.
    ///
    /// - Waits for the startup cache load first.
    /// - Without `force_refresh`, an already-held token returns immediately.
    /// - If an acquisition is already running, joins it instead of starting another.
    /// - Otherwise tries the refresh grant (if a refresh token is held) and
    ///   falls back to the password grant on any refresh failure.
    pub async fn ensure_token(self: &Arc<Self>, force_refresh: bool) -> Result<SecretString, Error> {
        self.wait_for_cache().await;

        let rx = {
            let mut state = self.lock_state();
            if !force_refresh {
                if let Some(token) = &state.access_token {
                    return Ok(token.clone());
                }
            }
            let rx = state.waiters.enqueue();
            if state.in_flight {
                debug!("authenticate in progress, queuing caller");
            } else {
                state.in_flight = true;
                self.spawn_acquisition();
            }
            rx
        };

        match rx.await {
            Ok(outcome) => outcome.map_err(Error::Auth),
            Err(_) => Err(Error::Auth(AuthError::Transport(
                "authentication task ended without an outcome".into(),
            ))),
        }
    }

    /// Drop the current access token so the next caller re-authenticates.
    ///
    /// The refresh token is kept; the next acquisition tries it first.
    pub fn invalidate_token(&self) {
        let mut state = self.lock_state();
        if state.access_token.take().is_some() {
            debug!("access token invalidated");
        }
        state.invalidated = true;
    }

    fn spawn_acquisition(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = session.acquire_token().await;
            session.complete_acquisition(outcome);
        });
    }

    async fn acquire_token(&self) -> Result<TokenPair, AuthError> {
        let has_refresh = self.lock_state().refresh_token.is_some();
        if has_refresh {
            debug!("found refresh token, attempting to refresh");
            match self.request_token(Grant::Refresh).await {
                Ok(pair) => {
                    info!("successfully refreshed oAuth token");
                    return Ok(pair);
                }
                Err(e) => warn!(error = %e, "oAuth refresh failed, attempting login"),
            }
        }
        self.request_token(Grant::Password).await
    }

    fn complete_acquisition(&self, outcome: Result<TokenPair, AuthError>) {
        let mut state = self.lock_state();
        state.in_flight = false;

        let delivered = match outcome {
            Ok(pair) => {
                state.access_token = Some(pair.access.clone());
                state.refresh_token = Some(pair.refresh.clone());
                state.invalidated = false;
                let record = CacheRecord {
                    hardware_id: Some(state.hardware_id.clone()),
                    access_token: Some(pair.access.expose_secret().to_owned()),
                    refresh_token: Some(pair.refresh.expose_secret().to_owned()),
                };
                let delivered = state.waiters.drain(&Ok(pair.access));
                drop(state);
                self.persist(record);
                delivered
            }
            Err(e) => {
                warn!(error = %e, "access_token request failed");
                state.waiters.drain(&Err(e))
            }
        };
        debug!(delivered, "authentication finished");
    }

    fn persist(&self, record: CacheRecord) {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move { cache.save(record).await });
    }

    async fn request_token(&self, grant: Grant) -> Result<TokenPair, AuthError> {
        let (body, hardware_id) = {
            let state = self.lock_state();
            let body = match grant {
                Grant::Password => json!({
                    "client_id": CLIENT_ID,
                    "grant_type": "password",
                    "username": self.config.username,
                    "password": self.config.password.expose_secret(),
                    "scope": SCOPE,
                }),
                Grant::Refresh => json!({
                    "client_id": CLIENT_ID,
                    "grant_type": "refresh_token",
                    "refresh_token": state
                        .refresh_token
                        .as_ref()
                        .map(|t| t.expose_secret().to_owned()),
                    "scope": SCOPE,
                }),
            };
            (body, state.hardware_id.clone())
        };

        debug!(?grant, "fetching access_token from oAuth token endpoint");
        let exchange = self.send_token_request(&body, &hardware_id);
        let (status, text) = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| AuthError::Transport("token request timed out".into()))??;

        debug!(status, "access_token response");
        parse_token_response(status, &text)
    }

    async fn send_token_request(&self, body: &Value, hardware_id: &str) -> Result<(u16, String), AuthError> {
        let resp = self
            .http
            .post(self.config.endpoints.oauth_token.clone())
            .header("hardware_id", hardware_id)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok((status, text))
    }
}

fn parse_token_response(status: u16, text: &str) -> Result<TokenPair, AuthError> {
    let parsed: TokenResponse = serde_json::from_str(text).map_err(|e| AuthError::Protocol {
        status,
        message: format!("JSON parse error from token endpoint: {e}"),
    })?;

    match (parsed.access_token, parsed.refresh_token) {
        (Some(access), Some(refresh)) if !access.is_empty() => Ok(TokenPair {
            access: SecretString::from(access),
            refresh: SecretString::from(refresh),
        }),
        _ => Err(AuthError::Protocol {
            status,
            message: "API failed to return an authentication_token".into(),
        }),
    }
}
