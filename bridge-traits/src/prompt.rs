//! Operator Prompt Abstraction
//!
//! The interactive half of the OAuth consent flow. The core never talks to a
//! terminal directly; hosts inject a [`CredentialPrompt`] (terminal, GUI
//! dialog, or a canned answer in tests).

use async_trait::async_trait;

use crate::error::Result;

/// What the operator answered when shown the consent URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    /// Authorization code copied from the consent page
    Code(String),
    /// The operator declined to authorize this run
    Skip,
}

#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Show `authorization_url` to the operator and wait for their answer.
    async fn request_authorization_code(&self, authorization_url: &str)
        -> Result<PromptResponse>;
}
