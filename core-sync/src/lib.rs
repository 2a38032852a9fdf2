//! # Incremental Drive Sync Engine
//!
//! Mirrors one remote folder into a static-site generator's file set,
//! fetching only what changed since the last successful run.
//!
//! ## Components
//!
//! - **Run state machine** (`job`): run lifecycle with validated transitions
//! - **Context** (`context`): configuration, collaborators and the run credential
//! - **Lister** (`lister`): lazy paginated listing and per-entry routing
//! - **Fetch pool** (`pool`): bounded concurrent workers
//! - **Pipeline** (`pipeline`): download, metadata extraction, persistence
//! - **Store layout** (`store`): stored records, watermark and token
//! - **Merge** (`merge`): rebuilds the file set from the store
//! - **Coordinator** (`coordinator`): drives a run end to end

pub mod codec;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod file_set;
pub mod job;
pub mod lister;
pub mod merge;
pub mod metadata;
pub mod pipeline;
pub mod pool;
pub mod store;

pub use codec::{is_text_mime, ContentEncoding};
pub use context::SyncContext;
pub use coordinator::SyncCoordinator;
pub use error::{PipelineError, Result, SyncError};
pub use file_set::{FileEntry, FileSet};
pub use job::{EntryFailure, RunId, RunState, RunSummary, SyncRun};
pub use lister::{classify, Disposition, ListingReport, Reconciler, RemoteLister};
pub use merge::{merge_into, MergeReport};
pub use metadata::{ExtractedDocument, FrontMatterExtractor, MetadataExtractor};
pub use pipeline::{DocumentPipeline, EntryOutcome};
pub use pool::FetchPool;
pub use store::{
    destination_path, DocumentStore, IndexStats, PendingEntry, RunParams, StoredRecord,
    MAX_REQUEUE_RUNS,
};
