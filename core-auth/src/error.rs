use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Invalid authorization code: {0}")]
    InvalidAuthCode(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("No credential available")]
    NotAuthenticated,

    #[error("Credential prompt failed: {0}")]
    Prompt(String),

    #[error("Invalid OAuth configuration: {0}")]
    InvalidConfig(String),

    #[error("Auth error: {0}")]
    Other(String),
}

impl AuthError {
    /// Errors raised before the token endpoint answered.
    pub fn is_network(&self) -> bool {
        matches!(self, AuthError::NetworkError(_))
    }
}

impl From<BridgeError> for AuthError {
    fn from(error: BridgeError) -> Self {
        if error.is_transient() {
            AuthError::NetworkError(error.to_string())
        } else {
            AuthError::Other(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
