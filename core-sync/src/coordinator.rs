//! # Sync Coordinator
//!
//! Drives one incremental sync from a remote folder into a [`FileSet`].
//!
//! ## Overview
//!
//! `SyncCoordinator` ties together the credential provider, the remote
//! listing, the fetch pool and the durable store. The store is the source of
//! truth for what the site contains; the remote is only asked for what
//! changed since the last successful run.
//!
//! ## Workflow
//!
//! 1. Resolve a credential (cached, refreshed or interactive). An operator
//!    skip ends the run without touching the file set.
//! 2. Apply cache options and load the id index of stored records.
//! 3. List children modified after the watermark, page by page.
//! 4. Evict trashed entries, skip folders, hand the rest to the fetch pool.
//! 5. Requeue entries whose fetch failed last run and that the listing did
//!    not return again.
//! 6. Each worker downloads, extracts metadata and persists one record.
//! 7. Merge every stored record into the file set.
//! 8. Record the retry list and the time listing began as the new watermark.
//!
//! A listing failure fails the run before the merge and keeps the old
//! watermark. Individual entry failures are reported in the
//! [`RunSummary`] and do not stop the run. Download and store failures are
//! kept in the retry list, so an unedited document that failed once is not
//! lost behind the watermark.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{FileSet, SyncContext, SyncCoordinator};
//! use std::sync::Arc;
//!
//! let ctx = Arc::new(SyncContext::new(config, remote, store, extractor, clock));
//! let coordinator = SyncCoordinator::new(ctx, credentials);
//!
//! let mut files = FileSet::new();
//! let summary = coordinator.run(&mut files).await?;
//! println!("{} documents, {} failed", summary.merged, summary.failed);
//! ```

use crate::context::SyncContext;
use crate::error::{PipelineError, Result, SyncError};
use crate::file_set::FileSet;
use crate::job::{RunState, RunSummary, SyncRun};
use crate::lister::{Reconciler, RemoteLister};
use crate::merge::merge_into;
use crate::pipeline::DocumentPipeline;
use crate::pool::FetchPool;
use crate::store::{PendingEntry, MAX_REQUEUE_RUNS};
use bridge_traits::http::RetryPolicy;
use bridge_traits::storage::{ListQuery, RemoteEntry};
use chrono::{DateTime, Utc};
use core_auth::{Authorization, CredentialProvider, OAuthTokens};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

pub struct SyncCoordinator {
    ctx: Arc<SyncContext>,
    credentials: Arc<dyn CredentialProvider>,
    download_retry_policy: Option<RetryPolicy>,
}

impl SyncCoordinator {
    pub fn new(ctx: Arc<SyncContext>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            ctx,
            credentials,
            download_retry_policy: None,
        }
    }

    /// Override the backoff between download attempts. The attempt count
    /// still comes from the configuration unless the policy says otherwise.
    pub fn with_download_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.download_retry_policy = Some(policy);
        self
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Run one sync into `files`.
    ///
    /// Returns the summary for `Done` and `Skipped` runs; a fatal error moves
    /// the run to `Failed` and is returned as-is.
    #[instrument(skip_all, fields(src = %self.ctx.config.src, dest = %self.ctx.config.dest))]
    pub async fn run(&self, files: &mut FileSet) -> Result<RunSummary> {
        let mut run = SyncRun::new(self.ctx.clock.now());
        info!(run_id = %run.id, "Starting sync run");

        match self.execute(&mut run, files).await {
            Ok(()) => Ok(run.summary),
            Err(e) => {
                run.fail(&e, self.ctx.clock.now());
                error!(run_id = %run.id, error = %e, "Sync run failed");
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &mut SyncRun, files: &mut FileSet) -> Result<()> {
        let ctx = &self.ctx;

        run.transition(RunState::Authenticating, ctx.clock.now())?;
        let Some(tokens) = self.authenticate().await? else {
            run.transition(RunState::Skipped, ctx.clock.now())?;
            info!(run_id = %run.id, "Authorization skipped, file set left untouched");
            return Ok(());
        };
        ctx.set_credential(tokens).await;

        let watermark = self.prepare_cache().await?;
        let pending = if ctx.config.cache {
            ctx.params.pending().await.map_err(SyncError::Store)?
        } else {
            Vec::new()
        };

        run.transition(RunState::ListingFetching, ctx.clock.now())?;
        let listing_started = ctx.clock.now();
        let retry = self.list_and_fetch(run, watermark, pending).await?;

        run.transition(RunState::Merging, ctx.clock.now())?;
        let merged = merge_into(&ctx.documents, files).await?;
        run.summary.merged = merged.merged;
        for failure in merged.failures {
            run.summary.record_failure(failure);
        }

        if ctx.config.cache {
            ctx.params
                .set_pending(&retry)
                .await
                .map_err(SyncError::Store)?;
            ctx.params
                .set_last_run(listing_started)
                .await
                .map_err(SyncError::Store)?;
            run.summary.watermark = Some(listing_started);
        }

        run.transition(RunState::Done, ctx.clock.now())?;
        info!(
            run_id = %run.id,
            listed = run.summary.listed,
            fetched = run.summary.fetched,
            requeued = run.summary.requeued,
            evicted = run.summary.evicted,
            failed = run.summary.failed,
            merged = run.summary.merged,
            "Sync run complete"
        );
        Ok(())
    }

    /// `None` when the operator skipped authorization.
    async fn authenticate(&self) -> Result<Option<OAuthTokens>> {
        let stored = self.ctx.params.token().await.map_err(SyncError::Store)?;

        match self.credentials.authorize(stored.clone()).await? {
            Authorization::Skipped => Ok(None),
            Authorization::Authorized(tokens) => {
                if stored.as_ref() != Some(&tokens) {
                    if let Err(e) = self.ctx.params.set_token(&tokens).await {
                        warn!(error = %e, "Failed to persist credential");
                    }
                }
                Ok(Some(tokens))
            }
        }
    }

    /// Apply the cache options and load the record index. Returns the
    /// watermark to list from, `None` for a full listing.
    async fn prepare_cache(&self) -> Result<Option<DateTime<Utc>>> {
        let ctx = &self.ctx;
        let config = &ctx.config;

        if config.invalidate_cache {
            info!("Invalidating cached documents");
            self.reset_cache().await?;
        } else if !config.cache {
            ctx.documents.clear().await.map_err(SyncError::Store)?;
        }

        let stats = ctx
            .documents
            .load_index(&config.dest)
            .await
            .map_err(SyncError::Store)?;
        if stats.discarded > 0 {
            warn!(discarded = stats.discarded, "Removed unreadable stored records");
        }

        if !config.cache {
            return Ok(None);
        }

        if stats.foreign > 0 {
            warn!(
                foreign = stats.foreign,
                "Stored records lie outside the destination, rebuilding cache"
            );
            self.reset_cache().await?;
            return Ok(None);
        }

        if stats.records == 0 {
            return Ok(None);
        }

        ctx.params.last_run().await.map_err(SyncError::Store)
    }

    async fn reset_cache(&self) -> Result<()> {
        self.ctx.documents.clear().await.map_err(SyncError::Store)?;
        self.ctx
            .params
            .clear_pending()
            .await
            .map_err(SyncError::Store)?;
        self.ctx
            .params
            .clear_last_run()
            .await
            .map_err(SyncError::Store)
    }

    /// Returns the entries to fetch again next run.
    async fn list_and_fetch(
        &self,
        run: &mut SyncRun,
        watermark: Option<DateTime<Utc>>,
        pending: Vec<PendingEntry>,
    ) -> Result<Vec<PendingEntry>> {
        let ctx = &self.ctx;
        let config = &ctx.config;
        let access_token = ctx.access_token().await?;

        let query = ListQuery::new(config.src.as_str())
            .modified_after(watermark)
            .page_size(config.page_size);
        info!(
            watermark = ?watermark,
            concurrency = config.concurrency,
            "Listing remote folder"
        );

        let mut pipeline = DocumentPipeline::new(ctx.clone(), access_token.clone());
        if let Some(policy) = &self.download_retry_policy {
            pipeline = pipeline.with_retry_policy(policy.clone());
        }

        let (sender, receiver) = mpsc::channel(config.buffer_size.max(1));
        let pool = FetchPool::spawn(config.concurrency, receiver, Arc::new(pipeline));

        let mut lister = RemoteLister::new(ctx.remote.clone(), access_token, query);
        let mut reconciler = Reconciler::new(&ctx.documents);
        let listed = match reconciler.run(&mut lister, &sender).await {
            Ok(()) => requeue(&pending, &reconciler, &sender).await,
            Err(e) => Err(e),
        };
        drop(sender);

        // Entries already handed out finish even when the listing failed.
        let outcomes = pool.join().await;

        let report = reconciler.into_report();
        run.summary.listed = report.listed;
        run.summary.evicted = report.evicted;
        run.summary.skipped = report.skipped;
        for failure in report.failures {
            run.summary.record_failure(failure);
        }

        run.summary.requeued = listed?;
        let previous: HashMap<&str, u32> = pending
            .iter()
            .map(|p| (p.entry.id.as_str(), p.attempts))
            .collect();

        let mut retry = Vec::new();
        for outcome in outcomes? {
            let Some(failure) = outcome.failure() else {
                run.summary.fetched += 1;
                continue;
            };
            run.summary.record_failure(failure);

            let keep = outcome
                .result
                .as_ref()
                .err()
                .map_or(false, PipelineError::should_requeue);
            if !keep {
                continue;
            }
            let attempts = previous.get(outcome.entry.id.as_str()).copied().unwrap_or(0) + 1;
            if attempts > MAX_REQUEUE_RUNS {
                warn!(
                    id = %outcome.entry.id,
                    name = %outcome.entry.name,
                    attempts,
                    "Giving up on entry after repeated failures"
                );
            } else {
                retry.push(PendingEntry {
                    entry: outcome.entry,
                    attempts,
                });
            }
        }
        Ok(retry)
    }
}

/// Send the entries that failed last run unless the listing already
/// returned them. Returns how many were sent.
async fn requeue(
    pending: &[PendingEntry],
    reconciler: &Reconciler<'_>,
    sink: &mpsc::Sender<RemoteEntry>,
) -> Result<usize> {
    let mut requeued = 0;
    for item in pending {
        if reconciler.has_listed(&item.entry.id) {
            continue;
        }
        sink.send(item.entry.clone()).await.map_err(|_| {
            SyncError::Worker("fetch pool stopped accepting entries".to_string())
        })?;
        requeued += 1;
    }
    if requeued > 0 {
        info!(requeued, "Requeued entries that failed in an earlier run");
    }
    Ok(requeued)
}
