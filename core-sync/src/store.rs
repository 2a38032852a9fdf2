//! Durable store layout.
//!
//! - `documents/<src>`: one [`StoredRecord`] per output path, JSON encoded.
//! - `params`: `last_run/<src>` (RFC 3339 watermark), `retry/<src>` (entries
//!   to fetch again next run) and `token` (OAuth tokens).
//!
//! [`DocumentStore`] keeps an id → keys index and its reverse, loaded once
//! per run, so evictions and renames can find a document's record without
//! scanning.

use crate::codec::{self, ContentEncoding};
use crate::error::{PipelineError, SyncError};
use crate::file_set::FileEntry;
use bridge_traits::error::BridgeError;
use bridge_traits::storage::{KeyValueStore, RemoteEntry};
use chrono::{DateTime, Utc};
use core_auth::OAuthTokens;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const PARAMS_NAMESPACE: &str = "params";
const TOKEN_KEY: &str = "token";

/// Runs a failed entry is requeued for before it is given up on.
pub const MAX_REQUEUE_RUNS: u32 = 5;

/// Output path for a remote name under the configured destination.
///
/// Names that would leave the destination or span directories are
/// rejected.
pub fn destination_path(dest: &str, name: &str) -> Result<String, PipelineError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(PipelineError::InvalidName(name.to_string()));
    }

    let dest = dest.trim_matches('/');
    if dest.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{}/{}", dest, name))
    }
}

fn is_under(dest: &str, path: &str) -> bool {
    let dest = dest.trim_matches('/');
    dest.is_empty()
        || path
            .strip_prefix(dest)
            .map_or(false, |rest| rest.starts_with('/'))
}

// ============================================================================
// Stored Record
// ============================================================================

/// Everything needed to rebuild one output document without the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    pub encoding: ContentEncoding,
    pub contents: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StoredRecord {
    /// Encode processed contents according to the mime type.
    pub fn encode(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        path: impl Into<String>,
        contents: &[u8],
        metadata: Map<String, Value>,
    ) -> Result<Self, PipelineError> {
        let mime_type = mime_type.into();
        let encoding = ContentEncoding::for_mime(&mime_type);
        Ok(Self {
            id: id.into(),
            name: name.into(),
            contents: codec::encode(encoding, contents)?,
            encoding,
            mime_type,
            path: path.into(),
            modified_time: None,
            metadata,
        })
    }

    pub fn with_modified_time(mut self, modified_time: Option<DateTime<Utc>>) -> Self {
        self.modified_time = modified_time;
        self
    }

    /// Rebuild the output document. Remote attributes are set first so
    /// front matter can override them.
    pub fn into_file_entry(self) -> Result<(String, FileEntry), PipelineError> {
        let contents = codec::decode(self.encoding, &self.contents)?;

        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::from(self.id));
        fields.insert("name".to_string(), Value::from(self.name));
        fields.insert("mimeType".to_string(), Value::from(self.mime_type));
        if let Some(modified) = self.modified_time {
            fields.insert("modifiedTime".to_string(), Value::from(modified.to_rfc3339()));
        }
        fields.extend(self.metadata);

        Ok((self.path, FileEntry { contents, fields }))
    }
}

// ============================================================================
// Document Store
// ============================================================================

/// What [`DocumentStore::load_index`] found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub records: usize,
    /// Records whose path lies outside the current destination
    pub foreign: usize,
    /// Unreadable records, removed while loading
    pub discarded: usize,
}

#[derive(Debug, Default)]
struct RecordIndex {
    keys_by_id: HashMap<String, BTreeSet<String>>,
    id_by_key: HashMap<String, String>,
}

impl RecordIndex {
    fn insert(&mut self, id: &str, key: &str) {
        if let Some(previous) = self.id_by_key.insert(key.to_string(), id.to_string()) {
            if previous != id {
                if let Some(keys) = self.keys_by_id.get_mut(&previous) {
                    keys.remove(key);
                }
            }
        }
        self.keys_by_id
            .entry(id.to_string())
            .or_default()
            .insert(key.to_string());
    }

    /// Make `key` the only key of `id`. Returns the keys it replaced.
    fn claim(&mut self, id: &str, key: &str) -> Vec<String> {
        let stale: Vec<String> = self
            .keys_by_id
            .remove(id)
            .unwrap_or_default()
            .into_iter()
            .filter(|k| k != key)
            .collect();
        for old in &stale {
            self.id_by_key.remove(old);
        }
        self.insert(id, key);
        stale
    }

    fn remove_id(&mut self, id: &str) -> BTreeSet<String> {
        let keys = self.keys_by_id.remove(id).unwrap_or_default();
        for key in &keys {
            self.id_by_key.remove(key);
        }
        keys
    }
}

pub struct DocumentStore {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    index: Mutex<RecordIndex>,
}

impl DocumentStore {
    pub fn new(store: Arc<dyn KeyValueStore>, source_id: &str) -> Self {
        Self {
            store,
            namespace: format!("documents/{}", source_id),
            index: Mutex::new(RecordIndex::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Rebuild the id index from the store.
    pub async fn load_index(&self, dest: &str) -> Result<IndexStats, BridgeError> {
        let entries = self.store.entries(&self.namespace).await?;
        let mut stats = IndexStats::default();
        let mut index = RecordIndex::default();

        for (key, value) in entries {
            match serde_json::from_str::<StoredRecord>(&value) {
                Ok(record) => {
                    stats.records += 1;
                    if !is_under(dest, &key) {
                        stats.foreign += 1;
                    }
                    index.insert(&record.id, &key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable stored record");
                    self.store.remove(&self.namespace, &key).await?;
                    stats.discarded += 1;
                }
            }
        }

        debug!(
            namespace = %self.namespace,
            records = stats.records,
            "Loaded document index"
        );
        *self.index.lock().await = index;
        Ok(stats)
    }

    /// Write a record at its path and drop any older key the same id used.
    pub async fn put(&self, record: &StoredRecord) -> Result<(), PipelineError> {
        let value =
            serde_json::to_string(record).map_err(|e| PipelineError::Encoding(e.to_string()))?;
        self.store
            .set(&self.namespace, &record.path, &value)
            .await
            .map_err(PipelineError::Store)?;

        let stale = self.index.lock().await.claim(&record.id, &record.path);

        for key in stale {
            debug!(id = %record.id, key = %key, "Removing record left behind by a rename");
            self.store
                .remove(&self.namespace, &key)
                .await
                .map_err(PipelineError::Store)?;
        }
        Ok(())
    }

    /// Remove every record belonging to `id`. Returns how many were removed.
    pub async fn evict(&self, id: &str) -> Result<usize, BridgeError> {
        let keys = self.index.lock().await.remove_id(id);
        for key in &keys {
            self.store.remove(&self.namespace, key).await?;
        }
        Ok(keys.len())
    }

    /// Every record, ordered by path.
    pub async fn records(&self) -> Result<Vec<(String, String)>, SyncError> {
        self.store
            .entries(&self.namespace)
            .await
            .map_err(SyncError::Store)
    }

    pub async fn clear(&self) -> Result<(), BridgeError> {
        self.store.clear(&self.namespace).await?;
        *self.index.lock().await = RecordIndex::default();
        Ok(())
    }
}

// ============================================================================
// Run Parameters
// ============================================================================

/// An entry whose fetch failed, kept so the next run fetches it even though
/// the watermark has moved past its modification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub entry: RemoteEntry,
    /// Consecutive runs in which the fetch failed
    pub attempts: u32,
}

/// Watermark, retry list and credential persistence in the `params`
/// namespace.
pub struct RunParams {
    store: Arc<dyn KeyValueStore>,
    last_run_key: String,
    retry_key: String,
}

impl RunParams {
    pub fn new(store: Arc<dyn KeyValueStore>, source_id: &str) -> Self {
        Self {
            store,
            last_run_key: format!("last_run/{}", source_id),
            retry_key: format!("retry/{}", source_id),
        }
    }

    pub async fn last_run(&self) -> Result<Option<DateTime<Utc>>, BridgeError> {
        let Some(raw) = self.store.get(PARAMS_NAMESPACE, &self.last_run_key).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(time) => Ok(Some(time.with_timezone(&Utc))),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unparsable watermark");
                Ok(None)
            }
        }
    }

    pub async fn set_last_run(&self, time: DateTime<Utc>) -> Result<(), BridgeError> {
        self.store
            .set(PARAMS_NAMESPACE, &self.last_run_key, &time.to_rfc3339())
            .await
    }

    pub async fn clear_last_run(&self) -> Result<(), BridgeError> {
        self.store.remove(PARAMS_NAMESPACE, &self.last_run_key).await
    }

    pub async fn pending(&self) -> Result<Vec<PendingEntry>, BridgeError> {
        let Some(raw) = self.store.get(PARAMS_NAMESPACE, &self.retry_key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(pending) => Ok(pending),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable retry list");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the retry list. An empty list removes the key.
    pub async fn set_pending(&self, pending: &[PendingEntry]) -> Result<(), BridgeError> {
        if pending.is_empty() {
            return self.clear_pending().await;
        }
        let raw = serde_json::to_string(pending)
            .map_err(|e| BridgeError::Storage(format!("Failed to encode retry list: {}", e)))?;
        self.store.set(PARAMS_NAMESPACE, &self.retry_key, &raw).await
    }

    pub async fn clear_pending(&self) -> Result<(), BridgeError> {
        self.store.remove(PARAMS_NAMESPACE, &self.retry_key).await
    }

    pub async fn token(&self) -> Result<Option<OAuthTokens>, BridgeError> {
        let Some(raw) = self.store.get(PARAMS_NAMESPACE, TOKEN_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored credential");
                Ok(None)
            }
        }
    }

    pub async fn set_token(&self, tokens: &OAuthTokens) -> Result<(), BridgeError> {
        let raw = serde_json::to_string(tokens)
            .map_err(|e| BridgeError::Storage(format!("Failed to encode credential: {}", e)))?;
        self.store.set(PARAMS_NAMESPACE, TOKEN_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::storage::InMemoryStore;
    use chrono::TimeZone;

    fn record(id: &str, path: &str, contents: &str) -> StoredRecord {
        StoredRecord::encode(id, path, "text/markdown", path, contents.as_bytes(), Map::new())
            .unwrap()
    }

    #[test]
    fn test_destination_path() {
        assert_eq!(destination_path("articles", "a.md").unwrap(), "articles/a.md");
        assert_eq!(destination_path("articles/", "a.md").unwrap(), "articles/a.md");
        assert_eq!(destination_path("", "a.md").unwrap(), "a.md");
        assert_eq!(destination_path("articles", "..a.md").unwrap(), "articles/..a.md");
        assert!(is_under("articles", "articles/a.md"));
        assert!(!is_under("articles", "articles-old/a.md"));
        assert!(is_under("", "anything"));
    }

    #[test]
    fn test_destination_path_rejects_escaping_names() {
        for name in ["", ".", "..", "../x.md", "sub/x.md", "..\\x.md", "a\0b"] {
            assert!(
                matches!(
                    destination_path("articles", name),
                    Err(PipelineError::InvalidName(_))
                ),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_front_matter_overrides_remote_fields() {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), Value::from("Custom"));
        let (path, entry) =
            StoredRecord::encode("x", "x.md", "text/markdown", "docs/x.md", b"body", metadata)
                .unwrap()
                .into_file_entry()
                .unwrap();

        assert_eq!(path, "docs/x.md");
        assert_eq!(entry.contents.as_ref(), b"body");
        assert_eq!(entry.fields["name"], Value::from("Custom"));
        assert_eq!(entry.fields["id"], Value::from("x"));
        assert_eq!(entry.fields["mimeType"], Value::from("text/markdown"));
    }

    #[tokio::test]
    async fn test_rename_drops_old_key() {
        let kv = Arc::new(InMemoryStore::new());
        let documents = DocumentStore::new(kv.clone(), "src");
        documents.load_index("").await.unwrap();

        documents.put(&record("a", "old.md", "v1")).await.unwrap();
        documents.put(&record("a", "new.md", "v2")).await.unwrap();

        let keys: Vec<String> = documents
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["new.md".to_string()]);
    }

    #[tokio::test]
    async fn test_path_taken_over_by_another_id() {
        let kv = Arc::new(InMemoryStore::new());
        let documents = DocumentStore::new(kv.clone(), "src");
        documents.load_index("").await.unwrap();

        documents.put(&record("a", "same.md", "from a")).await.unwrap();
        documents.put(&record("b", "same.md", "from b")).await.unwrap();

        // `a` no longer owns the key, so evicting it leaves `b` alone.
        assert_eq!(documents.evict("a").await.unwrap(), 0);
        let records = documents.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].1.contains("\"id\":\"b\""));

        assert_eq!(documents.evict("b").await.unwrap(), 1);
        assert!(documents.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_evict_uses_loaded_index() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        DocumentStore::new(kv.clone(), "src")
            .put(&record("c", "docs/c.md", "gone soon"))
            .await
            .unwrap();

        // A fresh handle, as in the next run
        let documents = DocumentStore::new(kv.clone(), "src");
        let stats = documents.load_index("docs").await.unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.foreign, 0);

        assert_eq!(documents.evict("c").await.unwrap(), 1);
        assert_eq!(documents.evict("c").await.unwrap(), 0);
        assert!(documents.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_index_counts_foreign_and_discards_garbage() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let documents = DocumentStore::new(kv.clone(), "src");
        documents.put(&record("a", "old/a.md", "x")).await.unwrap();
        kv.set(documents.namespace(), "new/broken.md", "{not json")
            .await
            .unwrap();

        let stats = documents.load_index("new").await.unwrap();

        assert_eq!(
            stats,
            IndexStats {
                records: 1,
                foreign: 1,
                discarded: 1
            }
        );
        assert_eq!(kv.get(documents.namespace(), "new/broken.md").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_params_round_trip() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let params = RunParams::new(kv.clone(), "folder-1");
        assert_eq!(params.last_run().await.unwrap(), None);

        let watermark = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        params.set_last_run(watermark).await.unwrap();
        assert_eq!(params.last_run().await.unwrap(), Some(watermark));
        assert!(kv
            .contains(PARAMS_NAMESPACE, "last_run/folder-1")
            .await
            .unwrap());

        let tokens = OAuthTokens::with_expiry("at".into(), Some("rt".into()), watermark);
        params.set_token(&tokens).await.unwrap();
        params.clear_last_run().await.unwrap();

        assert_eq!(params.last_run().await.unwrap(), None);
        assert_eq!(params.token().await.unwrap(), Some(tokens));
    }

    #[tokio::test]
    async fn test_pending_entries_round_trip() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let params = RunParams::new(kv.clone(), "folder-1");
        assert!(params.pending().await.unwrap().is_empty());

        let pending = vec![PendingEntry {
            entry: RemoteEntry::new("f", "flaky.md", "text/markdown"),
            attempts: 2,
        }];
        params.set_pending(&pending).await.unwrap();
        assert!(kv.contains(PARAMS_NAMESPACE, "retry/folder-1").await.unwrap());
        assert_eq!(params.pending().await.unwrap(), pending);

        params.set_pending(&[]).await.unwrap();
        assert!(!kv.contains(PARAMS_NAMESPACE, "retry/folder-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_watermark_is_ignored() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        kv.set(PARAMS_NAMESPACE, "last_run/s", "yesterday").await.unwrap();

        assert_eq!(RunParams::new(kv, "s").last_run().await.unwrap(), None);
    }
}
