//! Error types for sift.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using sift's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// How a failure should be treated by the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network blips, timeouts, upstream 5xx. Worth retrying in-stage.
    Transient,
    /// The input itself can never be processed (unsupported media, corrupt payload).
    FatalInput,
    /// Anything else. Fails the stage without in-stage retries, but the item stays retryable.
    Internal,
}

/// Core error type for sift operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content item not found
    #[error("Content item not found: {0}")]
    ItemNotFound(Uuid),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Transcription or diarization backend failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Media type the pipeline cannot process
    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    /// Input that can never be processed, regardless of retries
    #[error("Fatal input error: {0}")]
    FatalInput(String),

    /// Temporary upstream failure
    #[error("Transient error: {0}")]
    Transient(String),

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Illegal processing state transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error for retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Transient(_) | Error::Timeout(_) | Error::Request(_) => ErrorClass::Transient,
            Error::FatalInput(_) | Error::UnsupportedMedia(_) => ErrorClass::FatalInput,
            Error::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
                    ErrorClass::Transient
                }
                _ => ErrorClass::Internal,
            },
            _ => ErrorClass::Internal,
        }
    }

    /// True when retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// True when the input can never be processed.
    pub fn is_fatal_input(&self) -> bool {
        self.class() == ErrorClass::FatalInput
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Error::Timeout(e.to_string());
        }
        if e.is_connect() {
            return Error::Transient(e.to_string());
        }
        if let Some(status) = e.status() {
            if status.is_server_error() || status.as_u16() == 429 {
                return Error::Transient(e.to_string());
            }
        }
        Error::Request(e.to_string())
    }
}
