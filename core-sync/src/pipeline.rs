//! Per-entry processing: download → extract metadata → persist.
//!
//! Every failure here is confined to its entry and reported as an
//! [`EntryOutcome`]; nothing in this module can fail the run.

use crate::codec::is_text_mime;
use crate::context::SyncContext;
use crate::error::PipelineError;
use crate::job::EntryFailure;
use crate::store::StoredRecord;
use bridge_traits::http::RetryPolicy;
use bridge_traits::storage::RemoteEntry;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Result of processing one entry.
#[derive(Debug)]
pub struct EntryOutcome {
    pub entry: RemoteEntry,
    /// Store key written on success
    pub result: Result<String, PipelineError>,
}

impl EntryOutcome {
    pub fn failure(&self) -> Option<EntryFailure> {
        self.result.as_ref().err().map(|e| EntryFailure {
            entry_id: self.entry.id.clone(),
            name: self.entry.name.clone(),
            error: e.to_string(),
            transient: e.is_transient(),
        })
    }
}

pub struct DocumentPipeline {
    ctx: Arc<SyncContext>,
    access_token: String,
    retry_policy: RetryPolicy,
}

impl DocumentPipeline {
    pub fn new(ctx: Arc<SyncContext>, access_token: String) -> Self {
        let retry_policy = RetryPolicy {
            max_attempts: ctx.config.download_retries + 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            use_exponential_backoff: true,
        };
        Self {
            ctx,
            access_token,
            retry_policy,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[instrument(skip(self, entry), fields(id = %entry.id, name = %entry.name))]
    pub async fn process(&self, entry: RemoteEntry) -> EntryOutcome {
        let result = self.run(&entry).await;
        match &result {
            Ok(key) => debug!(key = %key, "Stored document"),
            Err(e) => warn!(error = %e, "Entry failed"),
        }
        EntryOutcome { entry, result }
    }

    async fn run(&self, entry: &RemoteEntry) -> Result<String, PipelineError> {
        let path = self.ctx.output_path(&entry.name)?;
        let raw = self.download(entry).await?;
        let (contents, metadata) = self.extract(entry, raw)?;
        self.persist(entry, path, &contents, metadata).await
    }

    async fn download(&self, entry: &RemoteEntry) -> Result<Bytes, PipelineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .ctx
                .remote
                .download(&self.access_token, &entry.id)
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.retry_policy.max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt);
                    debug!(attempt, ?delay, error = %e, "Retrying download");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(PipelineError::Download(e)),
            }
        }
    }

    /// Text documents must carry metadata; everything else passes through.
    fn extract(
        &self,
        entry: &RemoteEntry,
        raw: Bytes,
    ) -> Result<(Bytes, Map<String, Value>), PipelineError> {
        if !is_text_mime(&entry.mime_type) {
            return Ok((raw, Map::new()));
        }

        let text =
            std::str::from_utf8(&raw).map_err(|e| PipelineError::InvalidUtf8(e.to_string()))?;
        let extracted = self.ctx.extractor.extract(text)?;
        if extracted.fields.is_empty() {
            return Err(PipelineError::MalformedDocument(format!(
                "{} has no metadata fields",
                entry.name
            )));
        }

        Ok((Bytes::from(extracted.body), extracted.fields))
    }

    async fn persist(
        &self,
        entry: &RemoteEntry,
        path: String,
        contents: &[u8],
        metadata: Map<String, Value>,
    ) -> Result<String, PipelineError> {
        let record = StoredRecord::encode(
            entry.id.as_str(),
            entry.name.as_str(),
            entry.mime_type.as_str(),
            path,
            contents,
            metadata,
        )?
        .with_modified_time(entry.modified_time);

        self.ctx.documents.put(&record).await?;
        Ok(record.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ExtractedDocument, FrontMatterExtractor, MetadataExtractor};
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::storage::{
        InMemoryStore, KeyValueStore, ListPage, ListQuery, RemoteSource,
    };
    use bridge_traits::time::SystemClock;
    use core_runtime::{AuthConfig, SyncConfig};
    use mockall::mock;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers downloads from a script, one response per call.
    struct ScriptedRemote {
        responses: Mutex<VecDeque<BridgeResult<Bytes>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedRemote {
        fn new(responses: Vec<BridgeResult<Bytes>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteSource for ScriptedRemote {
        async fn list_children(
            &self,
            _access_token: &str,
            _query: &ListQuery,
            _page_token: Option<&str>,
        ) -> BridgeResult<ListPage> {
            Ok(ListPage::default())
        }

        async fn download(&self, access_token: &str, entry_id: &str) -> BridgeResult<Bytes> {
            self.calls
                .lock()
                .unwrap()
                .push((access_token.to_string(), entry_id.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BridgeError::OperationFailed("script exhausted".into())))
        }
    }

    mock! {
        Extractor {}

        impl MetadataExtractor for Extractor {
            fn extract(&self, text: &str) -> Result<ExtractedDocument, PipelineError>;
        }
    }

    fn pipeline(remote: Arc<ScriptedRemote>, retries: u32) -> (DocumentPipeline, Arc<SyncContext>) {
        pipeline_with(remote, retries, Arc::new(FrontMatterExtractor::new()))
    }

    fn pipeline_with(
        remote: Arc<ScriptedRemote>,
        retries: u32,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> (DocumentPipeline, Arc<SyncContext>) {
        let config = SyncConfig::builder()
            .src("folder")
            .dest("articles")
            .auth(AuthConfig::new("id", "secret", "urn:ietf:wg:oauth:2.0:oob"))
            .download_retries(retries)
            .build()
            .unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let ctx = Arc::new(SyncContext::new(
            config,
            remote,
            store,
            extractor,
            Arc::new(SystemClock),
        ));
        let pipeline = DocumentPipeline::new(ctx.clone(), "token".to_string())
            .with_retry_policy(RetryPolicy {
                max_attempts: retries + 1,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                use_exponential_backoff: false,
            });
        (pipeline, ctx)
    }

    async fn stored(ctx: &SyncContext, key: &str) -> Option<StoredRecord> {
        ctx.documents
            .records()
            .await
            .unwrap()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| serde_json::from_str(&v).unwrap())
    }

    #[tokio::test]
    async fn test_text_document_is_split_and_stored() {
        let remote = ScriptedRemote::new(vec![Ok(Bytes::from_static(
            b"---\ntitle: A\n---\nHello",
        ))]);
        let (pipeline, ctx) = pipeline(remote.clone(), 0);

        let outcome = pipeline
            .process(RemoteEntry::new("a", "a.md", "text/markdown"))
            .await;

        assert_eq!(outcome.result.unwrap(), "articles/a.md");
        assert_eq!(
            remote.calls.lock().unwrap()[0],
            ("token".to_string(), "a".to_string())
        );
        let record = stored(&ctx, "articles/a.md").await.unwrap();
        assert_eq!(record.contents, "Hello");
        assert_eq!(record.metadata["title"], Value::from("A"));
    }

    #[tokio::test]
    async fn test_binary_passes_through() {
        let remote = ScriptedRemote::new(vec![Ok(Bytes::from_static(&[0x89, 0x50, 0x00, 0xff]))]);
        let (pipeline, ctx) = pipeline(remote, 0);

        let outcome = pipeline
            .process(RemoteEntry::new("img", "logo.png", "image/png"))
            .await;

        assert!(outcome.result.is_ok());
        let record = stored(&ctx, "articles/logo.png").await.unwrap();
        assert!(record.metadata.is_empty());
        assert_eq!(record.contents, "iVAA/w==");
    }

    #[tokio::test]
    async fn test_missing_front_matter_is_malformed() {
        let remote = ScriptedRemote::new(vec![Ok(Bytes::from_static(b"no header here"))]);
        let (pipeline, ctx) = pipeline(remote, 0);

        let outcome = pipeline
            .process(RemoteEntry::new("b", "b.md", "text/markdown"))
            .await;

        assert!(matches!(
            outcome.result,
            Err(PipelineError::MalformedDocument(_))
        ));
        assert!(!outcome.failure().unwrap().transient);
        assert!(stored(&ctx, "articles/b.md").await.is_none());
    }

    #[tokio::test]
    async fn test_transient_download_is_retried() {
        let remote = ScriptedRemote::new(vec![
            Err(BridgeError::Timeout("slow".to_string())),
            Ok(Bytes::from_static(b"---\nk: v\n---\n")),
        ]);
        let (pipeline, _ctx) = pipeline(remote.clone(), 1);

        let outcome = pipeline
            .process(RemoteEntry::new("c", "c.md", "text/markdown"))
            .await;

        assert!(outcome.result.is_ok());
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let remote = ScriptedRemote::new(
            (0..5)
                .map(|_| Err(BridgeError::Connection("reset".to_string())))
                .collect(),
        );
        let (pipeline, _ctx) = pipeline(remote.clone(), 2);

        let outcome = pipeline
            .process(RemoteEntry::new("c", "c.md", "text/markdown"))
            .await;

        let failure = outcome.failure().unwrap();
        assert!(failure.transient);
        assert_eq!(failure.entry_id, "c");
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_download_error_is_not_retried() {
        let remote = ScriptedRemote::new(vec![
            Err(BridgeError::OperationFailed("404".to_string())),
            Ok(Bytes::from_static(b"---\nk: v\n---\n")),
        ]);
        let (pipeline, _ctx) = pipeline(remote.clone(), 2);

        let outcome = pipeline
            .process(RemoteEntry::new("gone", "gone.md", "text/markdown"))
            .await;

        assert!(matches!(outcome.result, Err(PipelineError::Download(_))));
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn test_name_escaping_destination_is_rejected_before_download() {
        let remote = ScriptedRemote::new(vec![Ok(Bytes::from_static(b"---\nk: v\n---\n"))]);
        let (pipeline, ctx) = pipeline(remote.clone(), 0);

        let outcome = pipeline
            .process(RemoteEntry::new("e", "../escape.md", "text/markdown"))
            .await;

        assert!(matches!(outcome.result, Err(PipelineError::InvalidName(_))));
        assert_eq!(remote.calls(), 0);
        assert!(ctx.documents.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_text() {
        let remote = ScriptedRemote::new(vec![Ok(Bytes::from_static(&[0xff, 0xfe, 0xfd]))]);
        let (pipeline, _ctx) = pipeline(remote, 0);

        let outcome = pipeline
            .process(RemoteEntry::new("u", "u.txt", "text/plain"))
            .await;

        assert!(matches!(outcome.result, Err(PipelineError::InvalidUtf8(_))));
    }

    #[tokio::test]
    async fn test_custom_extractor_sees_decoded_text() {
        let remote = ScriptedRemote::new(vec![Ok(Bytes::from("{\"title\": \"J\"}"))]);
        let mut extractor = MockExtractor::new();
        extractor
            .expect_extract()
            .withf(|text| text.starts_with('{'))
            .times(1)
            .returning(|_| {
                let mut fields = Map::new();
                fields.insert("title".to_string(), Value::from("J"));
                Ok(ExtractedDocument {
                    fields,
                    body: "rendered".to_string(),
                })
            });
        let (pipeline, ctx) = pipeline_with(remote, 0, Arc::new(extractor));

        let outcome = pipeline
            .process(RemoteEntry::new("j", "data.json", "application/json"))
            .await;

        assert!(outcome.result.is_ok());
        let record = stored(&ctx, "articles/data.json").await.unwrap();
        assert_eq!(record.contents, "rendered");
    }
}
