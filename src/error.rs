//! Error types for the transcription pipeline

use thiserror::Error;

/// Result type alias for transcription operations
pub type TranscribeResult<T> = Result<T, TranscribeError>;

/// Errors that can occur in the transcription pipeline.
///
/// The enum is `Clone` so a session's terminal outcome can be shared with
/// every client waiting on the same (user, episode) run.
#[derive(Error, Debug, Clone)]
pub enum TranscribeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Audio fetch error: {0}")]
    AudioFetch(String),

    #[error("ASR protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("Client protocol error: {0}")]
    ClientProtocol(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Session cancelled: {0}")]
    Cancelled(String),
}

impl From<rusqlite::Error> for TranscribeError {
    fn from(err: rusqlite::Error) -> Self {
        TranscribeError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for TranscribeError {
    fn from(err: serde_json::Error) -> Self {
        TranscribeError::Persistence(err.to_string())
    }
}
