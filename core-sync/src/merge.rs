//! Rebuild output documents from the durable store into a [`FileSet`].

use crate::error::SyncError;
use crate::file_set::FileSet;
use crate::job::EntryFailure;
use crate::store::{DocumentStore, StoredRecord};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub merged: usize,
    pub failures: Vec<EntryFailure>,
}

/// Insert or overwrite one file per stored record. Entries already in
/// `files` that have no record are left alone.
///
/// A record that cannot be decoded is reported and skipped; only a store
/// read failure aborts the merge.
#[instrument(skip_all, fields(namespace = %documents.namespace()))]
pub async fn merge_into(
    documents: &DocumentStore,
    files: &mut FileSet,
) -> Result<MergeReport, SyncError> {
    let mut report = MergeReport::default();

    for (key, value) in documents.records().await? {
        let decoded = match serde_json::from_str::<StoredRecord>(&value) {
            Ok(record) => {
                let id = record.id.clone();
                record.into_file_entry().map_err(|e| (id, e.to_string()))
            }
            Err(e) => Err((String::new(), e.to_string())),
        };

        match decoded {
            Ok((path, entry)) => {
                files.insert(path, entry);
                report.merged += 1;
            }
            Err((entry_id, error)) => {
                warn!(key = %key, error = %error, "Skipping undecodable record");
                report.failures.push(EntryFailure {
                    entry_id,
                    name: key,
                    error,
                    transient: false,
                });
            }
        }
    }

    info!(merged = report.merged, "Merged stored documents");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_set::FileEntry;
    use bridge_traits::storage::{InMemoryStore, KeyValueStore};
    use serde_json::{Map, Value};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_merge_overwrites_and_preserves() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let documents = DocumentStore::new(kv.clone(), "src");
        let mut metadata = Map::new();
        metadata.insert("title".to_string(), Value::from("A"));
        documents
            .put(
                &StoredRecord::encode("a", "a.md", "text/markdown", "blog/a.md", b"new", metadata)
                    .unwrap(),
            )
            .await
            .unwrap();
        documents
            .put(
                &StoredRecord::encode("p", "p.png", "image/png", "blog/p.png", &[0, 159], Map::new())
                    .unwrap(),
            )
            .await
            .unwrap();

        let mut files = FileSet::new();
        files.insert("blog/a.md", FileEntry::new("old"));
        files.insert("index.md", FileEntry::new("local"));

        let report = merge_into(&documents, &mut files).await.unwrap();

        assert_eq!(report.merged, 2);
        assert_eq!(files.len(), 3);
        assert_eq!(files.get("blog/a.md").unwrap().contents.as_ref(), b"new");
        assert_eq!(files.get("blog/a.md").unwrap().fields["title"], Value::from("A"));
        assert_eq!(files.get("blog/p.png").unwrap().contents.as_ref(), &[0, 159]);
        assert_eq!(files.get("index.md").unwrap().contents.as_ref(), b"local");
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported_not_fatal() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let documents = DocumentStore::new(kv.clone(), "src");
        let mut bad =
            StoredRecord::encode("b", "b.png", "image/png", "b.png", b"x", Map::new()).unwrap();
        bad.contents = "%%%".to_string();
        documents.put(&bad).await.unwrap();

        let mut files = FileSet::new();
        let report = merge_into(&documents, &mut files).await.unwrap();

        assert_eq!(report.merged, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(files.is_empty());
    }
}
