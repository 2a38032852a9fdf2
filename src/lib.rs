//! Workspace façade crate.
//!
//! Re-exports the `core-service` plugin surface so a host build pipeline can
//! depend on `drive-sync` alone. The `desktop-shims` feature (default) pulls
//! in the reqwest/SQLite/terminal collaborators used by
//! [`bootstrap`].

pub use core_service::*;
