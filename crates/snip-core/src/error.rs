use crate::store::ShortenedUrl;
use thiserror::Error;

/// Result type for [`UrlStore`](crate::UrlStore) operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

/// Errors returned by storage backends.
///
/// `UrlConflict` and `ShortUrlConflict` are signals rather than failures:
/// the first carries the record that already owns the original URL, the
/// second asks the caller to retry with a freshly generated code.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short url not found: {0}")]
    NotFound(String),
    #[error("original url is already shortened as '{}'", .0.short_code)]
    UrlConflict(Box<ShortenedUrl>),
    #[error("short code is already taken: {0}")]
    ShortUrlConflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
}

impl StorageError {
    /// Builds a `UrlConflict` around the record that already exists.
    pub fn url_conflict(existing: ShortenedUrl) -> Self {
        Self::UrlConflict(Box::new(existing))
    }

    /// Returns the existing record when this is a `UrlConflict`.
    pub fn into_existing(self) -> std::result::Result<ShortenedUrl, Self> {
        match self {
            Self::UrlConflict(existing) => Ok(*existing),
            other => Err(other),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
