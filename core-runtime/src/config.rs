//! # Sync Configuration
//!
//! Options recognized by the Drive sync plugin.
//!
//! ## Overview
//!
//! [`SyncConfig`] is built through [`SyncConfigBuilder`], which validates
//! every option before anything touches the network (fail-fast). The same
//! builder is what JSON configuration files deserialize into, so a file with a
//! missing `src` fails with the same error as a programmatic build.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AuthConfig, SyncConfig};
//!
//! let config = SyncConfig::builder()
//!     .src("1AbCdEfGh")
//!     .dest("articles")
//!     .auth(AuthConfig::new("client-id", "client-secret", "urn:ietf:wg:oauth:2.0:oob"))
//!     .concurrency(8)
//!     .build()?;
//! ```
//!
//! ```ignore
//! let config = SyncConfig::from_json_file("drive-sync.json")?;
//! ```
//!
//! The `auth` object accepts either the flat form
//! (`{"client_id", "client_secret", "redirect_uris"}`) or the client secret
//! file downloaded from the Google Cloud console
//! (`{"installed": {...}}` / `{"web": {...}}`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_BUFFER_SIZE: usize = 32;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Drive rejects larger `pageSize` values.
pub const MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 2;
pub const DEFAULT_STORE_PATH: &str = ".store/drive-sync.db";

/// OAuth client credentials for the Drive API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AuthConfigFile")]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    /// Consent endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_uri: Option<String>,
    /// Token endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
}

impl AuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uris: vec![redirect_uri.into()],
            auth_uri: None,
            token_uri: None,
        }
    }

    /// The redirect URI used for the consent flow (the first one listed).
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("auth.client_id cannot be empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::Config(
                "auth.client_secret cannot be empty".to_string(),
            ));
        }
        if self.redirect_uri().is_none() {
            return Err(Error::Config(
                "auth.redirect_uris must contain at least one URI".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uris", &self.redirect_uris)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Deserialize)]
struct AuthFields {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthConfigFile {
    Installed { installed: AuthFields },
    Web { web: AuthFields },
    Flat(AuthFields),
}

impl From<AuthConfigFile> for AuthConfig {
    fn from(file: AuthConfigFile) -> Self {
        let fields = match file {
            AuthConfigFile::Installed { installed } => installed,
            AuthConfigFile::Web { web } => web,
            AuthConfigFile::Flat(fields) => fields,
        };
        Self {
            client_id: fields.client_id,
            client_secret: fields.client_secret,
            redirect_uris: fields.redirect_uris,
            auth_uri: fields.auth_uri,
            token_uri: fields.token_uri,
        }
    }
}

/// Validated plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncConfig {
    /// Remote parent folder id
    pub src: String,
    /// Output path prefix inside the file set
    pub dest: String,
    pub auth: AuthConfig,
    /// Use the incremental watermark and keep documents between runs
    pub cache: bool,
    /// Drop cached documents and the watermark before this run
    pub invalidate_cache: bool,
    /// Maximum number of concurrent document pipelines
    pub concurrency: usize,
    /// Slots in the channel between the lister and the fetch pool
    pub buffer_size: usize,
    /// Entries requested per listing page
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Extra attempts for a download that failed transiently
    pub download_retries: u32,
    /// Location of the durable store
    pub store_path: PathBuf,
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let builder: SyncConfigBuilder = serde_json::from_str(json)?;
        builder.build()
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Checks every option; called by [`SyncConfigBuilder::build`].
    pub fn validate(&self) -> Result<()> {
        if self.src.trim().is_empty() {
            return Err(Error::Config("src cannot be empty".to_string()));
        }

        self.auth.validate()?;

        if self.concurrency == 0 {
            return Err(Error::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(Error::Config(
                "buffer_size must be greater than 0".to_string(),
            ));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.request_timeout_secs == 0 || self.download_timeout_secs == 0 {
            return Err(Error::Config(
                "timeouts must be greater than 0 seconds".to_string(),
            ));
        }

        if self.store_path.as_os_str().is_empty() {
            return Err(Error::Config("store_path cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`SyncConfig`].
///
/// Also the deserialization target for JSON configuration, which is why
/// every field is optional here and the camelCase spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfigBuilder {
    src: Option<String>,
    dest: Option<String>,
    auth: Option<AuthConfig>,
    cache: Option<bool>,
    #[serde(alias = "invalidateCache")]
    invalidate_cache: Option<bool>,
    concurrency: Option<usize>,
    #[serde(alias = "bufferSize")]
    buffer_size: Option<usize>,
    #[serde(alias = "pageSize")]
    page_size: Option<u32>,
    #[serde(alias = "requestTimeoutSecs")]
    request_timeout_secs: Option<u64>,
    #[serde(alias = "downloadTimeoutSecs")]
    download_timeout_secs: Option<u64>,
    #[serde(alias = "downloadRetries")]
    download_retries: Option<u32>,
    #[serde(alias = "storePath")]
    store_path: Option<PathBuf>,
}

impl SyncConfigBuilder {
    pub fn src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn invalidate_cache(mut self, invalidate: bool) -> Self {
        self.invalidate_cache = Some(invalidate);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.download_timeout_secs = Some(secs);
        self
    }

    pub fn download_retries(mut self, retries: u32) -> Self {
        self.download_retries = Some(retries);
        self
    }

    pub fn store_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Builds the configuration, failing on the first missing or invalid option.
    pub fn build(self) -> Result<SyncConfig> {
        let config = SyncConfig {
            src: self.src.ok_or(Error::MissingOption("src"))?,
            dest: self.dest.ok_or(Error::MissingOption("dest"))?,
            auth: self.auth.ok_or(Error::MissingOption("auth"))?,
            cache: self.cache.unwrap_or(true),
            invalidate_cache: self.invalidate_cache.unwrap_or(false),
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            buffer_size: self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            download_timeout_secs: self
                .download_timeout_secs
                .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            download_retries: self.download_retries.unwrap_or(DEFAULT_DOWNLOAD_RETRIES),
            store_path: self
                .store_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthConfig {
        AuthConfig::new("id", "secret", "urn:ietf:wg:oauth:2.0:oob")
    }

    #[test]
    fn test_builder_defaults() {
        let config = SyncConfig::builder()
            .src("folder")
            .dest("articles")
            .auth(auth())
            .build()
            .unwrap();

        assert!(config.cache);
        assert!(!config.invalidate_cache);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.buffer_size, 32);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.download_timeout(), Duration::from_secs(120));
        assert_eq!(config.download_retries, 2);
        assert_eq!(config.store_path, PathBuf::from(".store/drive-sync.db"));
    }

    #[test]
    fn test_missing_required_options() {
        let err = SyncConfig::builder().dest("d").auth(auth()).build().unwrap_err();
        assert!(matches!(err, Error::MissingOption("src")));

        let err = SyncConfig::builder().src("s").auth(auth()).build().unwrap_err();
        assert!(matches!(err, Error::MissingOption("dest")));

        let err = SyncConfig::builder().src("s").dest("d").build().unwrap_err();
        assert!(matches!(err, Error::MissingOption("auth")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = || SyncConfig::builder().src("s").dest("d").auth(auth());

        assert!(base().concurrency(0).build().is_err());
        assert!(base().buffer_size(0).build().is_err());
        assert!(base().page_size(5000).build().is_err());
        assert!(base().request_timeout_secs(0).build().is_err());
        assert!(base().src("  ").build().is_err());
        assert!(base()
            .auth(AuthConfig::new("", "secret", "uri"))
            .build()
            .is_err());
    }

    #[test]
    fn test_json_flat_auth_and_camel_case() {
        let config = SyncConfig::from_json_str(
            r#"{
                "src": "folder",
                "dest": "articles",
                "auth": {
                    "client_id": "id",
                    "client_secret": "secret",
                    "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob", "http://localhost"]
                },
                "invalidateCache": true,
                "concurrency": 3
            }"#,
        )
        .unwrap();

        assert!(config.invalidate_cache);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.auth.redirect_uri(), Some("urn:ietf:wg:oauth:2.0:oob"));
    }

    #[test]
    fn test_json_installed_client_secret_file() {
        let config = SyncConfig::from_json_str(
            r#"{
                "src": "folder",
                "dest": "",
                "auth": {
                    "installed": {
                        "client_id": "id.apps.googleusercontent.com",
                        "project_id": "blog",
                        "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                        "token_uri": "https://oauth2.googleapis.com/token",
                        "client_secret": "secret",
                        "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob"]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.auth.client_id, "id.apps.googleusercontent.com");
        assert_eq!(
            config.auth.token_uri.as_deref(),
            Some("https://oauth2.googleapis.com/token")
        );
        assert_eq!(config.dest, "");
    }

    #[test]
    fn test_json_missing_src_reports_option() {
        let err = SyncConfig::from_json_str(
            r#"{"dest": "d", "auth": {"client_id": "i", "client_secret": "s", "redirect_uris": ["u"]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingOption("src")));

        let err = SyncConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("drive-sync-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"src": "s", "dest": "d", "auth": {"web": {"client_id": "i", "client_secret": "s", "redirect_uris": ["u"]}}}"#,
        )
        .unwrap();

        let config = SyncConfig::from_json_file(&path).unwrap();
        assert_eq!(config.src, "s");

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            SyncConfig::from_json_file(&path).unwrap_err(),
            Error::Io(_)
        ));
    }

    #[test]
    fn test_auth_debug_redacts_secret() {
        let rendered = format!("{:?}", auth());
        assert!(!rendered.contains("secret\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}
