//! Durable credential cache.
//!
//! The session reads one [`CacheRecord`] at startup and overwrites it after
//! every successful token acquisition. Gateways never fail the caller:
//! load errors degrade to a cold start, save errors are only logged.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// File name used inside the cache directory.
pub const CACHE_FILE_NAME: &str = ".ringAlarmCache";

/// What survives a restart. Every field may be absent on a cold start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default, rename = "hardware_id", skip_serializing_if = "Option::is_none")]
    pub hardware_id: Option<String>,
    #[serde(default, rename = "oauthToken", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Load/save contract the session needs from persistent storage.
pub trait CredentialCache: Send + Sync {
    /// Read the stored record. Must not fail: problems yield an empty record.
    fn load(&self) -> BoxFuture<'_, CacheRecord>;

    /// Overwrite the stored record. Best effort.
    fn save(&self, record: CacheRecord) -> BoxFuture<'_, ()>;
}

// ── File-backed cache ───────────────────────────────────────────────

/// JSON file on disk, written through a temp file and renamed into place.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/.ringAlarmCache`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, record: &CacheRecord) -> std::io::Result<()> {
        let json = serde_json::to_vec(record)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

impl CredentialCache for FileCache {
    fn load(&self) -> BoxFuture<'_, CacheRecord> {
        Box::pin(async move {
            let raw = match tokio::fs::read_to_string(&self.path).await {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "no cached credentials");
                    return CacheRecord::default();
                }
            };
            match serde_json::from_str::<CacheRecord>(&raw) {
                Ok(record) => {
                    debug!(
                        path = %self.path.display(),
                        has_token = record.access_token.is_some(),
                        has_refresh = record.refresh_token.is_some(),
                        "found cached data"
                    );
                    record
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "error loading cached data");
                    CacheRecord::default()
                }
            }
        })
    }

    fn save(&self, record: CacheRecord) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self.write(&record).await {
                Ok(()) => debug!(path = %self.path.display(), "successfully saved token data"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "failed to persist token data"),
            }
        })
    }
}

// ── In-memory cache ─────────────────────────────────────────────────

/// Process-local cache. Useful when nothing should touch disk.
#[derive(Debug, Default)]
pub struct MemoryCache {
    record: Mutex<CacheRecord>,
}

impl MemoryCache {
    pub fn new(record: CacheRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }

    /// Last record handed to `save` (or the seed).
    pub fn snapshot(&self) -> CacheRecord {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CredentialCache for MemoryCache {
    fn load(&self) -> BoxFuture<'_, CacheRecord> {
        let record = self.snapshot();
        Box::pin(async move { record })
    }

    fn save(&self, record: CacheRecord) -> BoxFuture<'_, ()> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = record;
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_legacy_field_names() {
        let record = CacheRecord {
            hardware_id: Some("abc".into()),
            access_token: Some("tok".into()),
            refresh_token: Some("ref".into()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["hardware_id"], "abc");
        assert_eq!(json["oauthToken"], "tok");
        assert_eq!(json["refreshToken"], "ref");
    }

    #[tokio::test]
    async fn file_cache_round_trips_and_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::in_dir(dir.path());

        assert_eq!(cache.load().await, CacheRecord::default());

        let record = CacheRecord {
            hardware_id: Some("hw".into()),
            access_token: Some("a".into()),
            refresh_token: None,
        };
        cache.save(record.clone()).await;
        assert_eq!(cache.load().await, record);

        tokio::fs::write(cache.path(), "{not json").await.unwrap();
        assert_eq!(cache.load().await, CacheRecord::default());
    }
}
