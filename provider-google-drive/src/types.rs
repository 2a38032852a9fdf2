//! Google Drive API response types
//!
//! Data structures for deserializing Google Drive API v3 responses.

use bridge_traits::storage::RemoteEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Google Drive API file resource, restricted to the fields the sync requests
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    pub name: String,

    pub mime_type: String,

    #[serde(default)]
    pub trashed: bool,

    /// Modification time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        RemoteEntry {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            trashed: file.trashed,
            modified_time: file
                .modified_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// Token for next page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Error envelope returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub struct DriveErrorResponse {
    pub error: DriveErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct DriveErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<DriveErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct DriveErrorDetail {
    #[serde(default)]
    pub reason: String,
}

impl DriveErrorResponse {
    /// Drive reports per-user quota exhaustion as 403 with these reasons.
    pub fn is_rate_limited(&self) -> bool {
        self.error
            .errors
            .iter()
            .any(|e| e.reason == "rateLimitExceeded" || e.reason == "userRateLimitExceeded")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_list_response() {
        let json = r#"{
            "nextPageToken": "token123",
            "files": [
                {
                    "id": "a",
                    "name": "post1.md",
                    "mimeType": "text/markdown",
                    "trashed": false,
                    "modifiedTime": "2024-03-01T10:00:00.000Z"
                },
                {"id": "c", "name": "old.md", "mimeType": "text/markdown", "trashed": true}
            ]
        }"#;

        let response: FilesListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.next_page_token.as_deref(), Some("token123"));
        assert_eq!(response.files.len(), 2);

        let entries: Vec<RemoteEntry> = response.files.into_iter().map(Into::into).collect();
        assert_eq!(entries[0].id, "a");
        assert!(entries[0].modified_time.is_some());
        assert!(entries[1].trashed);
        assert!(entries[1].modified_time.is_none());
    }

    #[test]
    fn test_deserialize_empty_page() {
        let response: FilesListResponse = serde_json::from_str("{}").unwrap();
        assert!(response.files.is_empty());
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn test_rate_limit_detection() {
        let json = r#"{"error": {"code": 403, "message": "User Rate Limit Exceeded",
            "errors": [{"reason": "userRateLimitExceeded"}]}}"#;
        let response: DriveErrorResponse = serde_json::from_str(json).unwrap();
        assert!(response.is_rate_limited());
        assert_eq!(response.error.code, 403);
    }
}
