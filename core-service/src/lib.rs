//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, durable
//! store, operator prompt, clock) into the sync engine. Desktop hosts
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and call [`bootstrap`]; other hosts build a
//! [`CoreDependencies`] themselves.
//!
//! ```ignore
//! use core_service::{bootstrap, FileSet, SyncConfig};
//!
//! let config = SyncConfig::from_json_file("drive-sync.json")?;
//! let service = bootstrap(config).await?;
//!
//! let mut files = FileSet::new();
//! let summary = service.run(&mut files).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{Authorization, CredentialProvider, OAuthTokens};
pub use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use core_runtime::{AuthConfig, SyncConfig, SyncConfigBuilder};
pub use core_sync::{
    EntryFailure, FileEntry, FileSet, FrontMatterExtractor, MetadataExtractor, RunState,
    RunSummary,
};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    prompt::CredentialPrompt,
    storage::{KeyValueStore, RemoteSource},
    time::Clock,
};
use core_auth::{OAuthConfig, OAuthCredentialProvider, OAuthFlowManager};
use core_sync::{SyncContext, SyncCoordinator};
use provider_google_drive::GoogleDriveConnector;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub store: Arc<dyn KeyValueStore>,
    pub prompt: Arc<dyn CredentialPrompt>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn KeyValueStore>,
        prompt: Arc<dyn CredentialPrompt>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            store,
            prompt,
            clock,
        }
    }
}

/// One configured sync source. Built once per plugin instance; every
/// [`DriveSyncService::run`] is one sync.
#[derive(Clone)]
pub struct DriveSyncService {
    coordinator: Arc<SyncCoordinator>,
    store: Arc<dyn KeyValueStore>,
}

impl DriveSyncService {
    /// Wire the Google Drive connector and the OAuth credential provider
    /// over the given bridges.
    pub fn new(config: SyncConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let remote: Arc<dyn RemoteSource> = Arc::new(
            GoogleDriveConnector::new(deps.http_client.clone())
                .with_timeouts(config.request_timeout(), config.download_timeout()),
        );

        let flow = OAuthFlowManager::new(
            OAuthConfig::google(&config.auth)?,
            deps.http_client.clone(),
            deps.clock.clone(),
        );
        let credentials: Arc<dyn CredentialProvider> = Arc::new(OAuthCredentialProvider::new(
            flow,
            deps.prompt.clone(),
            deps.clock.clone(),
        ));

        Ok(Self::from_parts(
            config,
            remote,
            credentials,
            Arc::new(FrontMatterExtractor::new()),
            deps.store,
            deps.clock,
        ))
    }

    /// Assemble a service from arbitrary collaborators.
    pub fn from_parts(
        config: SyncConfig,
        remote: Arc<dyn RemoteSource>,
        credentials: Arc<dyn CredentialProvider>,
        extractor: Arc<dyn MetadataExtractor>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ctx = Arc::new(SyncContext::new(
            config,
            remote,
            store.clone(),
            extractor,
            clock,
        ));
        Self {
            coordinator: Arc::new(SyncCoordinator::new(ctx, credentials)),
            store,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.coordinator.context().config
    }

    /// The durable store shared by every run of this service.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    /// Run one sync into `files`.
    pub async fn run(&self, files: &mut FileSet) -> Result<RunSummary> {
        Ok(self.coordinator.run(files).await?)
    }
}

/// Convenience bootstrapper for desktop hosts: reqwest HTTP, the SQLite
/// store at `config.store_path`, a terminal prompt and the system clock.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap(config: SyncConfig) -> Result<DriveSyncService> {
    use bridge_desktop::{ReqwestHttpClient, SqliteKeyValueStore, TerminalPrompt};
    use bridge_traits::time::SystemClock;
    use tracing::info;

    config.validate()?;
    let http_client = ReqwestHttpClient::with_timeout(config.request_timeout())?;
    let store = SqliteKeyValueStore::new(config.store_path.clone()).await?;
    info!(store = %config.store_path.display(), "Opened durable store");

    let deps = CoreDependencies::new(
        Arc::new(http_client),
        Arc::new(store),
        Arc::new(TerminalPrompt::new()),
        Arc::new(SystemClock),
    );
    DriveSyncService::new(config, deps)
}
