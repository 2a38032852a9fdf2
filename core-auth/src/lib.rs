//! # Authentication Module
//!
//! OAuth 2.0 credentials for the Drive API.
//!
//! ## Overview
//!
//! - [`OAuthFlowManager`] talks to the token endpoint (PKCE consent URL,
//!   code exchange, refresh).
//! - [`CredentialProvider`] is the seam the sync engine depends on;
//!   [`OAuthCredentialProvider`] reuses, refreshes or interactively obtains a
//!   token and reports an operator skip as [`Authorization::Skipped`].
//!
//! The interactive step goes through the host's
//! [`CredentialPrompt`](bridge_traits::prompt::CredentialPrompt), so headless
//! runs and tests substitute their own.

pub mod error;
pub mod manager;
pub mod oauth;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::{CredentialProvider, OAuthCredentialProvider};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use types::{Authorization, OAuthTokens};
