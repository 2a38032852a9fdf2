//! Credential acquisition for one sync run.
//!
//! [`OAuthCredentialProvider`] resolves a usable token in this order:
//! 1. a cached token that has not expired,
//! 2. a refreshed token when the cached one carries a refresh token,
//! 3. the interactive consent flow through a [`CredentialPrompt`].
//!
//! Persisting the returned token is the caller's job; the provider never
//! touches storage.

use crate::error::{AuthError, Result};
use crate::oauth::OAuthFlowManager;
use crate::types::{Authorization, OAuthTokens};
use async_trait::async_trait;
use bridge_traits::prompt::{CredentialPrompt, PromptResponse};
use bridge_traits::time::Clock;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Produces the credential a run uses, or reports that the operator opted out.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn authorize(&self, stored: Option<OAuthTokens>) -> Result<Authorization>;
}

pub struct OAuthCredentialProvider {
    flow: OAuthFlowManager,
    prompt: Arc<dyn CredentialPrompt>,
    clock: Arc<dyn Clock>,
}

impl OAuthCredentialProvider {
    pub fn new(
        flow: OAuthFlowManager,
        prompt: Arc<dyn CredentialPrompt>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            flow,
            prompt,
            clock,
        }
    }

    async fn interactive(&self) -> Result<Authorization> {
        let (url, verifier) = self.flow.build_auth_url()?;

        let answer = self
            .prompt
            .request_authorization_code(&url)
            .await
            .map_err(|e| AuthError::Prompt(e.to_string()))?;

        match answer {
            PromptResponse::Skip => {
                info!("Operator skipped authorization");
                Ok(Authorization::Skipped)
            }
            PromptResponse::Code(code) => {
                let tokens = self.flow.exchange_code(&code, &verifier).await?;
                Ok(Authorization::Authorized(tokens))
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    #[instrument(skip(self, stored), fields(has_stored = stored.is_some()))]
    async fn authorize(&self, stored: Option<OAuthTokens>) -> Result<Authorization> {
        let Some(tokens) = stored else {
            return self.interactive().await;
        };

        if !tokens.is_expired_at(self.clock.now()) {
            info!("Reusing cached credential");
            return Ok(Authorization::Authorized(tokens));
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            warn!("Cached credential expired and cannot be refreshed");
            return self.interactive().await;
        };

        match self.flow.refresh_access_token(refresh_token).await {
            Ok(refreshed) => Ok(Authorization::Authorized(refreshed)),
            // Transport trouble is fatal; a rejected refresh token means consent again.
            Err(e) if e.is_network() => Err(e),
            Err(e) => {
                warn!(error = %e, "Refresh token rejected, asking for a new authorization");
                self.interactive().await
            }
        }
    }
}
