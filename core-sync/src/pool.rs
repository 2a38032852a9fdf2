//! Bounded pool of fetch workers.
//!
//! Workers share one receiver; each takes the next entry as soon as it is
//! free, so at most `concurrency` entries are in flight at any time.

use crate::error::SyncError;
use crate::pipeline::{DocumentPipeline, EntryOutcome};
use bridge_traits::storage::RemoteEntry;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

pub struct FetchPool {
    workers: Vec<JoinHandle<Vec<EntryOutcome>>>,
}

impl FetchPool {
    /// Spawn `concurrency` workers (at least one) draining `receiver`.
    pub fn spawn(
        concurrency: usize,
        receiver: mpsc::Receiver<RemoteEntry>,
        pipeline: Arc<DocumentPipeline>,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..concurrency.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(
                    async move {
                        let mut outcomes = Vec::new();
                        loop {
                            let next = receiver.lock().await.recv().await;
                            let Some(entry) = next else { break };
                            outcomes.push(pipeline.process(entry).await);
                        }
                        debug!(processed = outcomes.len(), "Fetch worker finished");
                        outcomes
                    }
                    .instrument(tracing::debug_span!("fetch_worker", worker)),
                )
            })
            .collect();

        Self { workers }
    }

    /// Wait for every worker. Returns once the sender side is dropped and
    /// all queued entries are processed.
    pub async fn join(self) -> Result<Vec<EntryOutcome>, SyncError> {
        let mut outcomes = Vec::new();
        for worker in self.workers {
            let processed = worker
                .await
                .map_err(|e| SyncError::Worker(e.to_string()))?;
            outcomes.extend(processed);
        }
        Ok(outcomes)
    }
}
