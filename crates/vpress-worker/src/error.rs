//! Worker error types.

use thiserror::Error;

use vpress_media::MediaError;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised by intake validation and the pipelines.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Client-safe summary of this error.
    ///
    /// Tool diagnostics can carry internal paths and full command lines;
    /// those stay in the server logs and the client sees a generic message.
    pub fn client_message(&self) -> String {
        match self {
            WorkerError::Validation(msg) => msg.clone(),
            WorkerError::Media(MediaError::Cancelled) => "Job was cancelled".to_string(),
            WorkerError::Media(MediaError::Timeout(_)) => "Processing timed out".to_string(),
            WorkerError::Media(MediaError::DownloadFailed { .. }) => {
                "Video download failed".to_string()
            }
            WorkerError::Media(MediaError::ToolNotFound(_)) => {
                "Processing tools are unavailable".to_string()
            }
            WorkerError::Media(_) => "Video processing failed".to_string(),
            WorkerError::Io(_) => "Storage operation failed".to_string(),
        }
    }
}
