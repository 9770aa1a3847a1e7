use crate::{FileStore, InMemoryStore, PostgresSettings, PostgresStore};
use snip_core::{Result, UrlStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default location of the file-backed store's snapshot.
pub const DEFAULT_FILE_PATH: &str = "/tmp/short-url-db.json";

/// Selects the storage backend at startup.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    #[default]
    InMemory,
    File { path: PathBuf },
    Postgres(PostgresSettings),
}

impl StoreConfig {
    fn backend_name(&self) -> &'static str {
        match self {
            Self::InMemory => "in-memory",
            Self::File { .. } => "file",
            Self::Postgres(_) => "postgres",
        }
    }
}

/// Builds the configured backend.
///
/// The store is created once here and then shared; callers hold it as
/// `Arc<dyn UrlStore>` and never need to know which backend is behind it.
pub async fn open_store(config: StoreConfig) -> Result<Arc<dyn UrlStore>> {
    let backend = config.backend_name();

    let store: Arc<dyn UrlStore> = match config {
        StoreConfig::InMemory => Arc::new(InMemoryStore::new()),
        StoreConfig::File { path } => Arc::new(FileStore::open(path).await?),
        StoreConfig::Postgres(settings) => Arc::new(PostgresStore::connect(&settings).await?),
    };

    info!(backend, "storage backend ready");
    Ok(store)
}
