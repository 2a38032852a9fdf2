//! # Google Drive Provider
//!
//! Implements [`RemoteSource`](bridge_traits::storage::RemoteSource) for
//! Google Drive API v3.
//!
//! ## Overview
//!
//! - Paginated listing of one folder's children (`files.list`)
//! - Content download (`files.get?alt=media`)
//! - Exponential backoff on rate limiting and server errors
//!
//! The access token is supplied per call by the sync engine, which obtains it
//! through `core-auth`.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GoogleDriveConnector, DRIVE_API_BASE};
pub use error::{GoogleDriveError, Result};
