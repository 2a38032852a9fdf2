//! Shared state for one sync run.

use crate::error::{PipelineError, Result, SyncError};
use crate::metadata::MetadataExtractor;
use crate::store::{destination_path, DocumentStore, RunParams};
use bridge_traits::storage::{KeyValueStore, RemoteSource};
use bridge_traits::time::Clock;
use core_auth::OAuthTokens;
use core_runtime::SyncConfig;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Configuration, collaborators and the run's credential, shared by the
/// lister, the fetch workers and the merge step.
pub struct SyncContext {
    pub config: SyncConfig,
    pub remote: Arc<dyn RemoteSource>,
    pub documents: DocumentStore,
    pub params: RunParams,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub clock: Arc<dyn Clock>,
    credential: RwLock<Option<OAuthTokens>>,
}

impl SyncContext {
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn KeyValueStore>,
        extractor: Arc<dyn MetadataExtractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            documents: DocumentStore::new(store.clone(), &config.src),
            params: RunParams::new(store, &config.src),
            config,
            remote,
            extractor,
            clock,
            credential: RwLock::new(None),
        }
    }

    pub async fn set_credential(&self, tokens: OAuthTokens) {
        *self.credential.write().await = Some(tokens);
    }

    pub async fn clear_credential(&self) {
        *self.credential.write().await = None;
    }

    pub async fn access_token(&self) -> Result<String> {
        self.credential
            .read()
            .await
            .as_ref()
            .map(|tokens| tokens.access_token.clone())
            .ok_or(SyncError::NotAuthenticated)
    }

    /// Output path for a remote name under the configured destination.
    pub fn output_path(&self, name: &str) -> std::result::Result<String, PipelineError> {
        destination_path(&self.config.dest, name)
    }
}
