//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop and server hosts.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (rustls, pooled connections)
//! - `KeyValueStore` using an SQLite table keyed by `(namespace, key)`
//! - `CredentialPrompt` using the terminal (stderr + stdin)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteKeyValueStore, TerminalPrompt};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http = ReqwestHttpClient::new()?;
//!     let store = SqliteKeyValueStore::new(".store/drive-sync.db".into()).await?;
//!     let prompt = TerminalPrompt::new();
//!     // Hand these to the sync service
//!     Ok(())
//! }
//! ```

mod http;
mod prompt;
mod store;

pub use http::ReqwestHttpClient;
pub use prompt::TerminalPrompt;
pub use store::SqliteKeyValueStore;
