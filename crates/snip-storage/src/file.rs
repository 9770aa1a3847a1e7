use crate::table::Table;
use async_trait::async_trait;
use snip_core::{
    DeleteUrlsTask, InternalStats, Result, SaveUrl, ShortCode, ShortenedUrl, StorageError,
    UrlStore,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// A [`UrlStore`] that keeps everything in memory and mirrors it to a JSON
/// file.
///
/// The whole map is serialized and rewritten after every mutating call, and
/// parsed back in full by [`FileStore::open`]. The file holds one object
/// mapping each short code to its record.
///
/// The rewrite is a plain overwrite: a crash mid-write can leave a truncated
/// file, and when the write fails the in-memory state stays ahead of the disk
/// (the I/O error is still returned to the caller).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl FileStore {
    /// Opens the snapshot at `path`, creating an empty one if it is missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let table = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Table::default(),
            Ok(bytes) => {
                let snapshot: HashMap<String, ShortenedUrl> = serde_json::from_slice(&bytes)
                    .map_err(|e| {
                        StorageError::InvalidData(format!(
                            "failed to parse snapshot '{}': {e}",
                            path.display()
                        ))
                    })?;
                Table::from_snapshot(snapshot)?
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let table = Table::default();
                write_snapshot(&path, &table).await?;
                table
            }
            Err(err) => return Err(err.into()),
        };

        info!(path = %path.display(), records = table.len(), "opened file store");

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Returns the path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn write_snapshot(path: &Path, table: &Table) -> Result<()> {
    let bytes = serde_json::to_vec(&table.snapshot())
        .map_err(|e| StorageError::InvalidData(format!("failed to serialize snapshot: {e}")))?;
    tokio::fs::write(path, bytes).await?;
    trace!(path = %path.display(), records = table.len(), "snapshot written");
    Ok(())
}

#[async_trait]
impl UrlStore for FileStore {
    async fn save_url(&self, request: SaveUrl) -> Result<ShortenedUrl> {
        let mut table = self.table.lock().await;
        let record = table.save(request)?;
        write_snapshot(&self.path, &table).await?;
        Ok(record)
    }

    async fn save_several_urls(&self, requests: Vec<SaveUrl>) -> Result<Vec<ShortenedUrl>> {
        let mut table = self.table.lock().await;
        let records = table.save_several(requests)?;
        write_snapshot(&self.path, &table).await?;
        Ok(records)
    }

    async fn get_by_short_url(&self, code: &ShortCode) -> Result<ShortenedUrl> {
        self.table.lock().await.get(code)
    }

    async fn get_urls_by_user_id(&self, owner_id: &str) -> Result<Vec<ShortenedUrl>> {
        Ok(self.table.lock().await.by_owner(owner_id))
    }

    async fn delete_by_short_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()> {
        let mut table = self.table.lock().await;
        let deleted = table.delete(codes, owner_id);
        debug!(owner = %owner_id, requested = codes.len(), deleted, "soft-deleted urls");
        write_snapshot(&self.path, &table).await
    }

    async fn do_delete_url_tasks(&self, tasks: &[DeleteUrlsTask]) -> Result<()> {
        let mut table = self.table.lock().await;
        let deleted = table.apply_tasks(tasks);
        debug!(tasks = tasks.len(), deleted, "applied delete tasks");
        write_snapshot(&self.path, &table).await
    }

    async fn internal_stats(&self) -> Result<InternalStats> {
        Ok(self.table.lock().await.stats())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
