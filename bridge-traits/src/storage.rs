//! Remote Source and Durable Store Abstractions
//!
//! Two capabilities the sync engine needs from the outside world:
//!
//! - [`RemoteSource`]: a paginated listing of a remote folder's children plus
//!   content download by id.
//! - [`KeyValueStore`]: namespaced string key/value persistence surviving
//!   across runs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::Result;

/// Mime type the remote uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// One remote listing record, before any content is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Stable remote identifier
    pub id: String,
    /// File name as shown by the remote
    pub name: String,
    /// Mime type reported by the remote
    pub mime_type: String,
    /// Whether the entry sits in the remote trash
    pub trashed: bool,
    /// Last modification time, when the remote reports it
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            trashed: false,
            modified_time: None,
        }
    }

    pub fn trashed(mut self, trashed: bool) -> Self {
        self.trashed = trashed;
        self
    }

    pub fn modified_at(mut self, time: DateTime<Utc>) -> Self {
        self.modified_time = Some(time);
        self
    }

    /// Folders are non-leaf entries and never carry content.
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Server-side filter for one listing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Parent folder whose direct children are listed
    pub parent_id: String,
    /// Only children modified strictly after this instant
    pub modified_after: Option<DateTime<Utc>>,
    /// Requested page size
    pub page_size: u32,
}

impl ListQuery {
    pub fn new(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            modified_after: None,
            page_size: 100,
        }
    }

    pub fn modified_after(mut self, watermark: Option<DateTime<Utc>>) -> Self {
        self.modified_after = watermark;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    /// Present when another page is available
    pub next_page_token: Option<String>,
}

/// Remote document source (Google Drive in production).
///
/// The access token is passed on every call so one connector can serve any
/// authorized session.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch a single page of the parent's children.
    async fn list_children(
        &self,
        access_token: &str,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> Result<ListPage>;

    /// Download the binary content of an entry.
    async fn download(&self, access_token: &str, entry_id: &str) -> Result<Bytes>;
}

/// Namespaced key/value persistence.
///
/// Writes to distinct keys never interfere, so callers may write concurrently
/// as long as no two writers share a key.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember(store: &dyn KeyValueStore) -> Result<()> {
///     store.set("params", "last_run/abc", "2024-01-01T00:00:00Z").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `Ok(None)` when absent
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value
    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key is not an error
    async fn remove(&self, namespace: &str, key: &str) -> Result<()>;

    /// Every key/value pair in the namespace, ordered by key
    async fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>>;

    /// Drop every key in the namespace
    async fn clear(&self, namespace: &str) -> Result<()>;

    /// Check if a key exists without returning it
    async fn contains(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }
}

/// Process-local [`KeyValueStore`], for headless runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(namespace).and_then(|ns| ns.get(key).cloned()))
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        if let Some(ns) = namespaces.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(namespace)
            .map(|ns| ns.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        self.namespaces.write().await.remove(namespace);
        Ok(())
    }
}
