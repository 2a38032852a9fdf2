//! Google Drive API connector implementation
//!
//! Implements [`RemoteSource`] for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{ListPage, ListQuery, RemoteEntry, RemoteSource, FOLDER_MIME_TYPE};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::types::{DriveErrorResponse, FilesListResponse};

/// Google Drive API base URL
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,mimeType,trashed,modifiedTime";

/// Google Drive API connector
///
/// # Features
///
/// - Paginated listing of a folder's direct children, folders excluded
///   server-side and an optional `modifiedTime` lower bound
/// - Content download through `files/{id}?alt=media`
/// - Exponential backoff when Drive answers 429, a rate-limit 403, or 5xx
/// - A timeout on every request
///
/// Transport failures (timeouts, refused connections) are returned as-is
/// without retrying; callers decide whether those are worth another attempt.
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use bridge_traits::storage::{ListQuery, RemoteSource};
///
/// let connector = GoogleDriveConnector::new(http_client);
/// let page = connector
///     .list_children(&access_token, &ListQuery::new(folder_id), None)
///     .await?;
/// ```
pub struct GoogleDriveConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    request_timeout: Duration,
    download_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl GoogleDriveConnector {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: DRIVE_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(120),
            retry_policy: RetryPolicy {
                max_attempts: 5,
                ..RetryPolicy::default()
            },
        }
    }

    /// Per-request timeouts for listing calls and content downloads.
    pub fn with_timeouts(mut self, request_timeout: Duration, download_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.download_timeout = download_timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Point the connector at another API root (a proxy or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Drive `q` expression selecting the non-folder children of `parent_id`.
    pub fn build_query(parent_id: &str, modified_after: Option<DateTime<Utc>>) -> String {
        let mut query = format!(
            "mimeType != '{}' and '{}' in parents",
            FOLDER_MIME_TYPE,
            escape_query_literal(parent_id)
        );

        if let Some(watermark) = modified_after {
            query.push_str(&format!(
                " and modifiedTime > '{}'",
                watermark.to_rfc3339_opts(SecondsFormat::Millis, true)
            ));
        }

        query
    }

    fn list_url(&self, query: &ListQuery, page_token: Option<&str>) -> String {
        let q = Self::build_query(&query.parent_id, query.modified_after);

        let mut url = format!(
            "{}/files?q={}&pageSize={}&fields={}",
            self.base_url,
            urlencoding::encode(&q),
            query.page_size,
            urlencoding::encode(&format!("nextPageToken,files({})", FILE_FIELDS)),
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        url
    }

    /// Send a GET, backing off on rate limiting and server errors.
    #[instrument(skip(self, access_token, url), fields(url = %url))]
    async fn execute_with_retry(
        &self,
        access_token: &str,
        url: &str,
        timeout: Duration,
        accept: &str,
    ) -> std::result::Result<HttpResponse, GoogleDriveError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = HttpRequest::get(url)
                .bearer_token(access_token)
                .header("Accept", accept)
                .timeout(timeout);

            let response = self.http_client.execute(request).await?;
            let status = response.status;

            if response.is_success() {
                debug!(status = status, attempt = attempt, "API request succeeded");
                return Ok(response);
            }

            let error_body = serde_json::from_slice::<DriveErrorResponse>(&response.body).ok();
            let rate_limited = status == 403
                && error_body.as_ref().is_some_and(DriveErrorResponse::is_rate_limited);

            if !(response.is_retryable() || rate_limited) {
                let message = error_body
                    .map(|e| e.error.message)
                    .unwrap_or_else(|| String::from_utf8_lossy(&response.body).to_string());
                warn!(status = status, "API request failed");

                return Err(match status {
                    401 | 403 => GoogleDriveError::AuthenticationFailed(message),
                    404 => GoogleDriveError::NotFound { resource: message },
                    _ => GoogleDriveError::ApiError {
                        status_code: status,
                        message,
                    },
                });
            }

            if attempt >= self.retry_policy.max_attempts {
                warn!(status = status, attempts = attempt, "API request failed after retries");
                return Err(if status == 429 || rate_limited {
                    GoogleDriveError::RateLimitExceeded { attempts: attempt }
                } else {
                    GoogleDriveError::ApiError {
                        status_code: status,
                        message: format!("Request failed after {} attempts", attempt),
                    }
                });
            }

            let delay = self.retry_policy.delay_for(attempt);
            warn!(
                status = status,
                attempt = attempt,
                max_attempts = self.retry_policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "API request throttled, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Escape a value placed inside single quotes in a Drive query.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl RemoteSource for GoogleDriveConnector {
    #[instrument(skip(self, access_token, query), fields(parent = %query.parent_id, incremental = query.modified_after.is_some()))]
    async fn list_children(
        &self,
        access_token: &str,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> Result<ListPage> {
        let url = self.list_url(query, page_token);

        let response = self
            .execute_with_retry(access_token, &url, self.request_timeout, "application/json")
            .await?;

        let list_response: FilesListResponse =
            serde_json::from_slice(&response.body).map_err(|e| {
                GoogleDriveError::ParseError(format!("Failed to parse files list response: {}", e))
            })?;

        let entries: Vec<RemoteEntry> = list_response.files.into_iter().map(Into::into).collect();

        info!(
            entries = entries.len(),
            has_more = list_response.next_page_token.is_some(),
            "Listed page from Google Drive"
        );

        Ok(ListPage {
            entries,
            next_page_token: list_response.next_page_token,
        })
    }

    #[instrument(skip(self, access_token), fields(entry_id = %entry_id))]
    async fn download(&self, access_token: &str, entry_id: &str) -> Result<Bytes> {
        let url = format!(
            "{}/files/{}?alt=media",
            self.base_url,
            urlencoding::encode(entry_id)
        );

        let response = self
            .execute_with_retry(access_token, &url, self.download_timeout, "*/*")
            .await?;

        debug!(bytes = response.body.len(), "Downloaded content");
        Ok(response.body)
    }
}
