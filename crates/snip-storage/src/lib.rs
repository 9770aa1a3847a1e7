//! Storage backends for the snip URL shortener.
//!
//! Three implementations of [`snip_core::UrlStore`] share one contract:
//! [`InMemoryStore`] for tests and single-process use, [`FileStore`] which
//! mirrors the map to a JSON file, and [`PostgresStore`] for shared
//! deployments. [`open_store`] picks one from a [`StoreConfig`].

mod config;
pub mod file;
pub mod memory;
pub mod postgres;
mod table;

pub use config::{open_store, StoreConfig, DEFAULT_FILE_PATH};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use postgres::{PostgresSettings, PostgresStore};
pub use snip_core::{Result, StorageError, UrlStore};
