//! # Host Bridge Traits
//!
//! Capability traits the sync engine requires from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the core crates and the concrete
//! adapters in `bridge-desktop` (or test fakes). Each trait represents one
//! capability the engine needs but must not implement itself.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests with per-request timeouts
//! - [`RemoteSource`](storage::RemoteSource) - Paginated remote listing and content download
//!
//! ### Storage
//! - [`KeyValueStore`](storage::KeyValueStore) - Namespaced durable key/value storage
//!
//! ### Operator interaction
//! - [`CredentialPrompt`](prompt::CredentialPrompt) - Ask the operator for an authorization code
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters should
//! map timeouts and connection failures to the transient variants so callers
//! can decide whether to retry.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the fetch pool shares them across
//! worker tasks.

pub mod error;
pub mod http;
pub mod prompt;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use prompt::{CredentialPrompt, PromptResponse};
pub use storage::{
    InMemoryStore, KeyValueStore, ListPage, ListQuery, RemoteEntry, RemoteSource,
    FOLDER_MIME_TYPE,
};
pub use time::{Clock, SystemClock};
