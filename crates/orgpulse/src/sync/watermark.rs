//! Per-organization sync watermarks.
//!
//! The watermark is the latest commit timestamp a run has observed for an
//! organization. The next run lists commits from there instead of from the
//! start of the look-back window. Watermarks only move forward and are
//! persisted in their own JSON document, written the same way as the cache
//! snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheError;
use crate::cache::snapshot::{read_optional, write_atomic};

/// Sync state of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgSyncState {
    /// Latest commit timestamp synchronized.
    pub watermark: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WatermarkDocument {
    #[serde(default)]
    orgs: BTreeMap<String, OrgSyncState>,
}

/// Shared watermark store. Clones refer to the same state.
#[derive(Clone, Default)]
pub struct WatermarkStore {
    path: Option<PathBuf>,
    doc: Arc<Mutex<WatermarkDocument>>,
    flush_lock: Arc<tokio::sync::Mutex<()>>,
}

impl WatermarkStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the document at `path`; missing or unreadable files start empty.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match Self::load(&path).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable watermarks");
                WatermarkDocument::default()
            }
        };
        Self {
            path: Some(path),
            doc: Arc::new(Mutex::new(doc)),
            flush_lock: Arc::default(),
        }
    }

    async fn load(path: &Path) -> Result<WatermarkDocument, CacheError> {
        match read_optional(path).await? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt(e.to_string()))
            }
            None => Ok(WatermarkDocument::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatermarkDocument> {
        self.doc.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, org: &str) -> Option<OrgSyncState> {
        self.lock().orgs.get(org).cloned()
    }

    /// Record a finished run.
    ///
    /// The watermark becomes the later of the stored one and `observed`. With
    /// nothing stored and nothing observed there is no state to record.
    pub fn advance(
        &self,
        org: &str,
        observed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<OrgSyncState> {
        let mut doc = self.lock();
        let previous = doc.orgs.get(org).map(|s| s.watermark);
        let watermark = match (previous, observed) {
            (Some(p), Some(o)) => p.max(o),
            (Some(p), None) => p,
            (None, Some(o)) => o,
            (None, None) => return None,
        };

        let state = OrgSyncState {
            watermark,
            last_synced_at: now,
        };
        doc.orgs.insert(org.to_string(), state.clone());
        Some(state)
    }

    /// Persist the document. A no-op for in-memory stores.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        let bytes = serde_json::to_vec_pretty(&*self.lock())?;
        write_atomic(path, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_observation_creates_state() {
        let store = WatermarkStore::in_memory();
        assert!(store.advance("acme", None, at(0)).is_none());
        assert!(store.get("acme").is_none());

        let state = store.advance("acme", Some(at(10)), at(20)).unwrap();
        assert_eq!(state.watermark, at(10));
        assert_eq!(state.last_synced_at, at(20));
    }

    #[test]
    fn watermark_never_regresses() {
        let store = WatermarkStore::in_memory();
        store.advance("acme", Some(at(100)), at(200));
        let state = store.advance("acme", Some(at(50)), at(300)).unwrap();
        assert_eq!(state.watermark, at(100));
        assert_eq!(state.last_synced_at, at(300));

        let state = store.advance("acme", None, at(400)).unwrap();
        assert_eq!(state.watermark, at(100));
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");

        let store = WatermarkStore::open(&path).await;
        store.advance("acme", Some(at(10)), at(20));
        store.flush().await.unwrap();

        let reopened = WatermarkStore::open(&path).await;
        assert_eq!(reopened.get("acme").unwrap().watermark, at(10));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(raw["orgs"]["acme"]["lastSyncedAt"].is_string());
    }

    #[tokio::test]
    async fn corrupt_document_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = WatermarkStore::open(&path).await;
        assert!(store.get("acme").is_none());
    }
}
