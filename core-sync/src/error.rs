use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Run-level failures. Any of these ends the run in `Failed` and leaves the
/// watermark where it was.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Authorization failed: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("No credential available for this run")]
    NotAuthenticated,

    #[error("Listing failed: {0}")]
    Listing(#[source] BridgeError),

    #[error("Durable store error: {0}")]
    Store(#[source] BridgeError),

    #[error("Fetch worker failed: {0}")]
    Worker(String),

    #[error("Invalid run id: {0}")]
    InvalidRunId(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures confined to one entry. Recorded in the run summary, never
/// propagated to the run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Download failed: {0}")]
    Download(#[source] BridgeError),

    #[error("Content is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Metadata could not be parsed: {0}")]
    Metadata(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Store write failed: {0}")]
    Store(#[source] BridgeError),

    #[error("Name cannot be used as an output path: {0:?}")]
    InvalidName(String),
}

impl PipelineError {
    /// Whether another attempt at the same entry might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Download(e) | PipelineError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the entry should be fetched again on the next run even if
    /// the remote does not list it. Content defects only clear up when the
    /// document is edited, which lists it anyway.
    pub fn should_requeue(&self) -> bool {
        matches!(self, PipelineError::Download(_) | PipelineError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::Download(BridgeError::Timeout("t".into())).is_transient());
        assert!(!PipelineError::Download(BridgeError::OperationFailed("404".into())).is_transient());
        assert!(!PipelineError::MalformedDocument("no front matter".into()).is_transient());
        assert!(!PipelineError::InvalidUtf8("byte 3".into()).is_transient());
    }

    #[test]
    fn test_requeue_classification() {
        assert!(PipelineError::Download(BridgeError::OperationFailed("500".into())).should_requeue());
        assert!(PipelineError::Store(BridgeError::Storage("locked".into())).should_requeue());
        assert!(!PipelineError::MalformedDocument("no front matter".into()).should_requeue());
        assert!(!PipelineError::InvalidName("..".into()).should_requeue());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Listing(BridgeError::Connection("refused".into()));
        assert_eq!(err.to_string(), "Listing failed: Connection failed: refused");
    }
}
