use crate::table::Table;
use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::{
    DeleteUrlsTask, InternalStats, Result, SaveUrl, ShortCode, ShortenedUrl, UrlStore,
};
use tracing::{debug, trace};

/// In-memory implementation of [`UrlStore`].
///
/// A single `RwLock` guards the table. The short-code map and the
/// original-URL index must change together, which a sharded map cannot
/// guarantee, so every operation takes the lock for its whole duration.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    table: RwLock<Table>,
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records, deleted ones included.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UrlStore for InMemoryStore {
    async fn save_url(&self, request: SaveUrl) -> Result<ShortenedUrl> {
        trace!(code = %request.short_code, url = %request.original_url, "saving url");
        self.table.write().save(request)
    }

    async fn save_several_urls(&self, requests: Vec<SaveUrl>) -> Result<Vec<ShortenedUrl>> {
        trace!(count = requests.len(), "saving url batch");
        self.table.write().save_several(requests)
    }

    async fn get_by_short_url(&self, code: &ShortCode) -> Result<ShortenedUrl> {
        self.table.read().get(code)
    }

    async fn get_urls_by_user_id(&self, owner_id: &str) -> Result<Vec<ShortenedUrl>> {
        Ok(self.table.read().by_owner(owner_id))
    }

    async fn delete_by_short_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()> {
        let deleted = self.table.write().delete(codes, owner_id);
        debug!(owner = %owner_id, requested = codes.len(), deleted, "soft-deleted urls");
        Ok(())
    }

    async fn do_delete_url_tasks(&self, tasks: &[DeleteUrlsTask]) -> Result<()> {
        let deleted = self.table.write().apply_tasks(tasks);
        debug!(tasks = tasks.len(), deleted, "applied delete tasks");
        Ok(())
    }

    async fn internal_stats(&self) -> Result<InternalStats> {
        Ok(self.table.read().stats())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
