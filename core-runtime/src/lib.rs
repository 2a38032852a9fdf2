//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the sync crates:
//! - Logging and tracing setup
//! - Plugin configuration with fail-fast validation
//!
//! ## Overview
//!
//! Nothing here knows about Drive or the sync engine itself. The other crates
//! read their options from [`config::SyncConfig`] and emit `tracing` events
//! that [`logging::init_logging`] routes to the chosen output format.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AuthConfig, SyncConfig, SyncConfigBuilder};
pub use error::{Error, Result};
