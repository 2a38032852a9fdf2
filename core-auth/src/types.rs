//! Credential types shared by the OAuth flow and the credential provider.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds before the real expiry at which a token is treated as expired.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// OAuth 2.0 token set.
///
/// Serialized as JSON into the run parameters so later runs can reuse it.
/// `Debug` output never includes the token values.
///
/// # Example
///
/// ```
/// use core_auth::OAuthTokens;
/// use chrono::{Duration, Utc};
///
/// let tokens = OAuthTokens::with_expiry(
///     "ya29.a0...".to_string(),
///     Some("1//0g...".to_string()),
///     Utc::now() + Duration::hours(1),
/// );
///
/// assert!(!tokens.is_expired_at(Utc::now()));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token; Google only returns one on the first consent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Token set expiring `expires_in` seconds after `issued_at`.
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self::with_expiry(
            access_token,
            refresh_token,
            issued_at + Duration::seconds(expires_in),
        )
    }

    pub fn with_expiry(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Expired, or expiring within [`EXPIRY_BUFFER_SECS`] of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(EXPIRY_BUFFER_SECS)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Outcome of [`CredentialProvider::authorize`](crate::CredentialProvider::authorize).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// A usable credential for this run
    Authorized(OAuthTokens),
    /// The operator declined; the run ends without touching anything
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_buffer() {
        let now = Utc::now();
        let fresh = OAuthTokens::new("a".into(), None, 3600, now);
        let nearly = OAuthTokens::new("a".into(), None, 60, now);

        assert!(!fresh.is_expired_at(now));
        assert!(nearly.is_expired_at(now));
        assert!(fresh.is_expired_at(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = OAuthTokens::new("secret-access".into(), Some("secret-refresh".into()), 10, Utc::now());
        let rendered = format!("{:?}", tokens);

        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[test]
    fn test_serde_round_trip_without_refresh() {
        let tokens = OAuthTokens::new("a".into(), None, 10, Utc::now());
        let json = serde_json::to_string(&tokens).unwrap();

        assert!(!json.contains("refresh_token"));
        assert_eq!(serde_json::from_str::<OAuthTokens>(&json).unwrap(), tokens);
    }
}
