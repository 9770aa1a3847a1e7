use snip_core::{
    DeleteUrlsTask, InternalStats, Result, SaveUrl, ShortCode, ShortenedUrl, StorageError,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// The map shared by the in-memory and file-backed stores.
///
/// Records are keyed by short code with a secondary index by original URL, so
/// both uniqueness checks are lookups. The table itself is not synchronized;
/// each store wraps it in a lock and holds that lock for a whole operation.
#[derive(Debug)]
pub(crate) struct Table {
    records: HashMap<ShortCode, ShortenedUrl>,
    by_original: HashMap<String, ShortCode>,
    next_id: i64,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            by_original: HashMap::new(),
            next_id: 1,
        }
    }
}

impl Table {
    /// Rebuilds a table from a snapshot keyed by short code.
    pub(crate) fn from_snapshot(snapshot: HashMap<String, ShortenedUrl>) -> Result<Self> {
        let mut table = Self::default();

        for (key, record) in snapshot {
            if key != record.short_code.as_str() {
                return Err(StorageError::InvalidData(format!(
                    "snapshot key '{}' does not match short url '{}'",
                    key, record.short_code
                )));
            }
            if table.by_original.contains_key(&record.original_url) {
                return Err(StorageError::InvalidData(format!(
                    "original url '{}' is stored more than once",
                    record.original_url
                )));
            }

            table.next_id = table.next_id.max(record.id + 1);
            table
                .by_original
                .insert(record.original_url.clone(), record.short_code.clone());
            table.records.insert(record.short_code.clone(), record);
        }

        Ok(table)
    }

    /// Returns the records ordered by short code for stable serialization.
    pub(crate) fn snapshot(&self) -> BTreeMap<&str, &ShortenedUrl> {
        self.records
            .iter()
            .map(|(code, record)| (code.as_str(), record))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn find_by_original(&self, original_url: &str) -> Option<&ShortenedUrl> {
        self.by_original
            .get(original_url)
            .and_then(|code| self.records.get(code))
    }

    pub(crate) fn save(&mut self, request: SaveUrl) -> Result<ShortenedUrl> {
        if let Some(existing) = self.find_by_original(&request.original_url) {
            return Err(StorageError::url_conflict(existing.clone()));
        }

        if self.records.contains_key(&request.short_code) {
            return Err(StorageError::ShortUrlConflict(request.short_code.into_string()));
        }

        let record = self.build(request, 0);
        self.insert(record.clone());
        self.next_id += 1;
        Ok(record)
    }

    /// Saves a batch all-or-nothing.
    ///
    /// The whole batch is validated before anything is inserted, so a short
    /// code collision leaves the table untouched.
    pub(crate) fn save_several(&mut self, requests: Vec<SaveUrl>) -> Result<Vec<ShortenedUrl>> {
        let mut results = Vec::with_capacity(requests.len());
        let mut pending = Vec::new();
        let mut seen_originals = HashSet::new();
        let mut claimed_codes = HashSet::new();

        for request in requests {
            if !seen_originals.insert(request.original_url.clone()) {
                continue;
            }

            if let Some(existing) = self.find_by_original(&request.original_url) {
                results.push(existing.clone());
                continue;
            }

            if self.records.contains_key(&request.short_code)
                || !claimed_codes.insert(request.short_code.clone())
            {
                return Err(StorageError::ShortUrlConflict(request.short_code.into_string()));
            }

            let record = self.build(request, pending.len() as i64);
            results.push(record.clone());
            pending.push(record);
        }

        self.next_id += pending.len() as i64;
        for record in pending {
            self.insert(record);
        }

        Ok(results)
    }

    pub(crate) fn get(&self, code: &ShortCode) -> Result<ShortenedUrl> {
        self.records
            .get(code)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    pub(crate) fn by_owner(&self, owner_id: &str) -> Vec<ShortenedUrl> {
        let mut records: Vec<ShortenedUrl> = self
            .records
            .values()
            .filter(|record| record.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        records
    }

    /// Soft-deletes the codes owned by `owner_id` and returns how many records
    /// changed state.
    pub(crate) fn delete(&mut self, codes: &[ShortCode], owner_id: &str) -> usize {
        let mut changed = 0;

        for code in codes {
            let Some(record) = self.records.get_mut(code) else {
                continue;
            };
            if record.owner_id != owner_id || record.is_deleted {
                continue;
            }
            record.is_deleted = true;
            changed += 1;
        }

        changed
    }

    pub(crate) fn apply_tasks(&mut self, tasks: &[DeleteUrlsTask]) -> usize {
        tasks
            .iter()
            .map(|task| self.delete(&task.short_codes, &task.owner_id))
            .sum()
    }

    pub(crate) fn stats(&self) -> InternalStats {
        let owners: HashSet<&str> = self
            .records
            .values()
            .map(|record| record.owner_id.as_str())
            .collect();

        InternalStats {
            urls: self.records.len() as u64,
            users: owners.len() as u64,
        }
    }

    fn build(&self, request: SaveUrl, offset: i64) -> ShortenedUrl {
        ShortenedUrl {
            id: self.next_id + offset,
            short_code: request.short_code,
            original_url: request.original_url,
            owner_id: request.owner_id,
            is_deleted: false,
        }
    }

    fn insert(&mut self, record: ShortenedUrl) {
        self.by_original
            .insert(record.original_url.clone(), record.short_code.clone());
        self.records.insert(record.short_code.clone(), record);
    }
}
