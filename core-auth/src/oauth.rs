//! OAuth 2.0 Authorization Flow with PKCE Support
//!
//! Implements the installed-application flow (RFC 6749 + RFC 7636) used to
//! obtain Drive credentials:
//! - Building the consent URL with a PKCE challenge
//! - Exchanging the pasted authorization code for tokens
//! - Refreshing access tokens
//!
//! The operator copies the code from the consent page, so there is no
//! redirect callback to carry the `state` back; the PKCE verifier binds the
//! code to this process instead.
//!
//! Never logs tokens, codes or verifiers.
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use core_runtime::config::AuthConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> core_auth::Result<()> {
//! # use bridge_traits::{http::HttpClient, time::SystemClock};
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let auth = AuthConfig::new("client-id", "secret", "urn:ietf:wg:oauth:2.0:oob");
//! let flow = OAuthFlowManager::new(
//!     OAuthConfig::google(&auth)?,
//!     http_client,
//!     Arc::new(SystemClock),
//! );
//! let (url, verifier) = flow.build_auth_url()?;
//! // show `url`, read the code back...
//! let tokens = flow.exchange_code("4/0Ab...", &verifier).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::time::Clock;
use core_runtime::config::AuthConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Content download needs more than the metadata scope.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth 2.0 client configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Optional for public clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    /// Google endpoints and the Drive read-only scope, honouring endpoint
    /// overrides from a client secret file.
    pub fn google(auth: &AuthConfig) -> Result<Self> {
        let redirect_uri = auth
            .redirect_uri()
            .ok_or_else(|| AuthError::InvalidConfig("no redirect URI configured".to_string()))?;

        Ok(Self {
            client_id: auth.client_id.clone(),
            client_secret: Some(auth.client_secret.clone()),
            redirect_uri: redirect_uri.to_string(),
            scopes: vec![DRIVE_READONLY_SCOPE.to_string()],
            auth_url: auth
                .auth_uri
                .clone()
                .unwrap_or_else(|| GOOGLE_AUTH_URL.to_string()),
            token_url: auth
                .token_uri
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
        })
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// PKCE (Proof Key for Code Exchange) verifier.
///
/// Only the challenge derived from it is sent with the consent URL; the
/// verifier itself goes to the token endpoint with the code.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Fresh verifier (32 random bytes) and state (16 random bytes), both
    /// base64url without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier").finish_non_exhaustive()
    }
}

/// Token endpoint client for one OAuth application.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            http_client,
            clock,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Override how often a refresh is retried on 5xx / transport errors.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Build the consent URL. Keep the returned verifier for
    /// [`exchange_code`](Self::exchange_code).
    #[instrument(skip(self))]
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            // Request a refresh token
            query.append_pair("access_type", "offline");
        }

        debug!("Built authorization URL");
        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for tokens.
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(&self, code: &str, verifier: &PkceVerifier) -> Result<OAuthTokens> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::InvalidAuthCode("empty authorization code".to_string()));
        }

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier.verifier()),
        ];
        if let Some(ref client_secret) = self.config.client_secret {
            params.push(("client_secret", client_secret.as_str()));
        }

        debug!("Exchanging authorization code for tokens");

        let response = self.post_token_request(&params).await?;

        if !response.is_success() {
            let status = response.status;
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            warn!(status = status, "Token exchange failed");

            return Err(AuthError::InvalidAuthCode(format!(
                "Token endpoint returned {}: {}",
                status, error_body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Other(format!("Failed to parse token response: {}", e)))?;

        info!(
            expires_in = token_response.expires_in,
            has_refresh_token = token_response.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );

        Ok(OAuthTokens::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
            self.clock.now(),
        ))
    }

    /// Obtain a fresh access token. The refresh token is carried over when the
    /// endpoint does not rotate it.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(ref client_secret) = self.config.client_secret {
            params.push(("client_secret", client_secret.as_str()));
        }

        debug!("Refreshing access token");

        let mut attempt = 0;
        loop {
            attempt += 1;

            let outcome = self.post_token_request(&params).await;
            let retry_reason = match outcome {
                Ok(response) if response.is_success() => {
                    let token_response: TokenResponse = response.json().map_err(|e| {
                        AuthError::Other(format!("Failed to parse token response: {}", e))
                    })?;

                    info!(expires_in = token_response.expires_in, "Refreshed access token");

                    return Ok(OAuthTokens::new(
                        token_response.access_token,
                        token_response
                            .refresh_token
                            .or_else(|| Some(refresh_token.to_string())),
                        token_response.expires_in,
                        self.clock.now(),
                    ));
                }
                Ok(response) if response.is_retryable() => {
                    format!("status {}", response.status)
                }
                Ok(response) => {
                    let status = response.status;
                    let error_body = response
                        .text()
                        .unwrap_or_else(|_| "Unable to read error response".to_string());

                    warn!(status = status, "Token refresh rejected");

                    return Err(AuthError::TokenRefreshFailed(format!(
                        "Token endpoint returned {}: {}",
                        status, error_body
                    )));
                }
                Err(e) if e.is_network() => e.to_string(),
                Err(e) => return Err(e),
            };

            if attempt >= self.retry_policy.max_attempts {
                return Err(AuthError::NetworkError(format!(
                    "Token refresh failed after {} attempts: {}",
                    attempt, retry_reason
                )));
            }

            let delay = self.retry_policy.delay_for(attempt);
            warn!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %retry_reason,
                "Token refresh failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn post_token_request(&self, params: &[(&str, &str)]) -> Result<HttpResponse> {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

        let request = HttpRequest::post(self.config.token_url.clone())
            .form(encoded)
            .timeout(TOKEN_REQUEST_TIMEOUT);

        Ok(self.http_client.execute(request).await?)
    }
}

/// JSON body returned by the token endpoint.
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}
