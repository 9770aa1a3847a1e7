use snip_core::StorageError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("short url not found: {0}")]
    NotFound(String),
    #[error("short url has been deleted: {0}")]
    Deleted(String),
    #[error("could not find a free short code: {0}")]
    ShortCodeConflict(String),
    #[error("deletion queue is closed")]
    QueueClosed,
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(code) => Self::NotFound(code),
            StorageError::ShortUrlConflict(code) => Self::ShortCodeConflict(code),
            other => Self::Storage(other),
        }
    }
}

impl From<QueueError> for ShortenerError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Closed => Self::QueueClosed,
            other => Self::Storage(StorageError::Unavailable(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("deletion queue consumer is already started")]
    AlreadyStarted,
    #[error("deletion queue is closed")]
    Closed,
    #[error("deletion queue did not stop within {0:?}")]
    ShutdownTimedOut(Duration),
    #[error("deletion queue consumer failed: {0}")]
    Join(String),
}
