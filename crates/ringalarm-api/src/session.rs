// Process-wide session state.
//
// One `Session` owns the OAuth tokens, the stable hardware id, the 401
// retry counter, and the socket sequence counter. Token acquisition
// lives in `auth.rs`, the REST dispatcher in `http.rs`; both are
// inherent methods so every consumer shares the same guards.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;
use tracing::debug;

use crate::cache::{CacheRecord, CredentialCache};
use crate::config::SessionConfig;
use crate::error::{AuthError, Error};
use crate::queue::PendingQueue;
use crate::transport;

/// Observable phase of the authentication state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// No access token and nothing has been invalidated yet.
    Cold,
    /// One token acquisition is in flight.
    Authenticating,
    /// An access token is held.
    Authenticated,
    /// A consumer dropped the token (401 or socket failure).
    Invalidated,
}

/// Gate for operations issued before the cache load finishes.
#[derive(Debug)]
pub(crate) enum CacheGate {
    Loading(PendingQueue<()>),
    Loaded,
}

#[derive(Debug)]
pub(crate) struct AuthState {
    pub(crate) access_token: Option<SecretString>,
    pub(crate) refresh_token: Option<SecretString>,
    pub(crate) hardware_id: String,
    pub(crate) invalidated: bool,
    pub(crate) in_flight: bool,
    pub(crate) waiters: PendingQueue<Result<SecretString, AuthError>>,
    pub(crate) cache: CacheGate,
}

/// Authenticated handle on the Ring cloud.
///
/// Cheap to share via `Arc`. Construct with [`Session::start`], which
/// kicks off the credential cache load in the background; every token
/// request waits for that load before doing anything else.
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) cache: Arc<dyn CredentialCache>,
    pub(crate) state: Mutex<AuthState>,
    pub(crate) retry_counter: AtomicU32,
    seqno: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.config.username)
            .field("phase", &self.auth_phase())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate the config, build the HTTP client, and start loading the cache.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: SessionConfig, cache: Arc<dyn CredentialCache>) -> Result<Arc<Self>, Error> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Config("a Tokio runtime is required".into()))?;
        let http = transport::build_client(&config)?;

        let session = Arc::new(Self {
            config,
            http,
            cache,
            state: Mutex::new(AuthState {
                access_token: None,
                refresh_token: None,
                hardware_id: uuid::Uuid::new_v4().simple().to_string(),
                invalidated: false,
                in_flight: false,
                waiters: PendingQueue::new(),
                cache: CacheGate::Loading(PendingQueue::new()),
            }),
            retry_counter: AtomicU32::new(0),
            seqno: AtomicU64::new(1),
        });

        let loader = Arc::clone(&session);
        runtime.spawn(async move {
            let record = loader.cache.load().await;
            loader.finish_cache_load(record);
        });

        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stable per-install identifier, persisted alongside the tokens.
    pub fn hardware_id(&self) -> String {
        self.lock_state().hardware_id.clone()
    }

    pub fn auth_phase(&self) -> AuthPhase {
        let state = self.lock_state();
        if state.in_flight {
            AuthPhase::Authenticating
        } else if state.access_token.is_some() {
            AuthPhase::Authenticated
        } else if state.invalidated {
            AuthPhase::Invalidated
        } else {
            AuthPhase::Cold
        }
    }

    pub fn has_token(&self) -> bool {
        self.lock_state().access_token.is_some()
    }

    /// Next socket sequence number. Never reused for the life of the session.
    pub fn next_seq(&self) -> u64 {
        self.seqno.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park until the startup cache load has completed.
    pub(crate) async fn wait_for_cache(&self) {
        let rx = {
            let mut state = self.lock_state();
            match &mut state.cache {
                CacheGate::Loaded => return,
                CacheGate::Loading(queue) => {
                    debug!("cache read in progress, queuing caller");
                    queue.enqueue()
                }
            }
        };
        // A dropped sender still means the gate is gone.
        let _ = rx.await;
    }

    fn finish_cache_load(&self, record: CacheRecord) {
        let mut state = self.lock_state();
        if let Some(hardware_id) = record.hardware_id {
            state.hardware_id = hardware_id;
        }
        if let Some(token) = record.access_token {
            state.access_token = Some(SecretString::from(token));
        }
        if let Some(token) = record.refresh_token {
            state.refresh_token = Some(SecretString::from(token));
        }

        let gate = std::mem::replace(&mut state.cache, CacheGate::Loaded);
        if let CacheGate::Loading(mut queue) = gate {
            let released = queue.drain(&());
            if released > 0 {
                debug!(released, "clearing callbacks from the cache queue");
            }
        }
    }
}
