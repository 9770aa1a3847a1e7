use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored URL mapping.
///
/// Records are never physically removed; deletion only flips `is_deleted`.
/// The serialized field names are the ones written by the file-backed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenedUrl {
    /// Assigned by the store, increasing per store instance.
    pub id: i64,
    #[serde(rename = "short_url")]
    pub short_code: ShortCode,
    pub original_url: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Parameters for saving a new mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveUrl {
    /// The original URL to be shortened.
    pub original_url: String,
    /// Candidate short code; the store rejects it if another URL owns it.
    pub short_code: ShortCode,
    /// Identity of the creator.
    pub owner_id: String,
}

impl SaveUrl {
    pub fn new(
        original_url: impl Into<String>,
        short_code: ShortCode,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            original_url: original_url.into(),
            short_code,
            owner_id: owner_id.into(),
        }
    }
}

/// A deletion request: the owner and the short codes they want deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteUrlsTask {
    pub owner_id: String,
    pub short_codes: Vec<ShortCode>,
}

impl DeleteUrlsTask {
    pub fn new(owner_id: impl Into<String>, short_codes: Vec<ShortCode>) -> Self {
        Self {
            owner_id: owner_id.into(),
            short_codes,
        }
    }
}

/// Aggregate counters derived from the store contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalStats {
    /// Number of stored records, deleted ones included.
    pub urls: u64,
    /// Number of distinct owners.
    pub users: u64,
}

/// The storage contract shared by every backend.
///
/// Implementations must keep two invariants under concurrent use: short codes
/// are unique, and an original URL maps to at most one record whatever its
/// deletion state.
#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Saves a new mapping.
    ///
    /// Returns `Err(UrlConflict(existing))` when the original URL is already
    /// stored, and `Err(ShortUrlConflict)` when the proposed code belongs to a
    /// different URL.
    async fn save_url(&self, request: SaveUrl) -> Result<ShortenedUrl>;

    /// Saves several mappings as one unit.
    ///
    /// Already stored URLs are returned as they are instead of failing the
    /// batch. Either every new record is persisted or none is. The result holds
    /// one record per distinct original URL in no particular order.
    async fn save_several_urls(&self, requests: Vec<SaveUrl>) -> Result<Vec<ShortenedUrl>>;

    /// Retrieves a record by short code, deleted records included.
    /// Returns `Err(NotFound)` if the code does not exist.
    async fn get_by_short_url(&self, code: &ShortCode) -> Result<ShortenedUrl>;

    /// Lists every record created by `owner_id`.
    async fn get_urls_by_user_id(&self, owner_id: &str) -> Result<Vec<ShortenedUrl>>;

    /// Marks the given codes as deleted when they belong to `owner_id`.
    /// Codes owned by someone else, or unknown codes, are skipped silently.
    async fn delete_by_short_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()>;

    /// Applies a batch of deletion tasks, each with the same ownership rule as
    /// [`UrlStore::delete_by_short_urls`].
    async fn do_delete_url_tasks(&self, tasks: &[DeleteUrlsTask]) -> Result<()>;

    /// Counts records and distinct owners.
    async fn internal_stats(&self) -> Result<InternalStats>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}
