//! Error types for Google Drive provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// Access token missing, expired or lacking scope (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit still exceeded after every retry
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// File or folder not found
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Transport-level failure from the HTTP client
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

impl From<GoogleDriveError> for BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        match error {
            // Keep timeout/connection classification intact for callers that retry.
            GoogleDriveError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GoogleDriveError::ApiError {
            status_code: 400,
            message: "Invalid Value".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Google Drive API error (status 400): Invalid Value"
        );
    }

    #[test]
    fn test_error_conversion_preserves_transient() {
        let bridge: BridgeError =
            GoogleDriveError::from(BridgeError::Timeout("slow".to_string())).into();
        assert!(bridge.is_transient());

        let bridge: BridgeError =
            GoogleDriveError::AuthenticationFailed("Token expired".to_string()).into();
        assert!(matches!(bridge, BridgeError::OperationFailed(_)));
        assert!(!bridge.is_transient());
    }
}
