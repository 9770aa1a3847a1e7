use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use snip_core::ShortCode;
use snip_shortener::{BatchItem, QueueSettings};
use snip_storage::{PostgresSettings, StoreConfig, DEFAULT_FILE_PATH};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const FLUSH_INTERVAL_ENV: &str = "SNIP_FLUSH_INTERVAL_SECS";
pub const QUEUE_CAPACITY_ENV: &str = "SNIP_QUEUE_CAPACITY";
pub const SHUTDOWN_GRACE_ENV: &str = "SNIP_SHUTDOWN_GRACE_SECS";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Shorten, resolve and delete URLs")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::File
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, default_value = DEFAULT_FILE_PATH)]
    pub file_storage_path: PathBuf,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = FLUSH_INTERVAL_ENV, default_value_t = DEFAULT_FLUSH_INTERVAL_SECS)]
    pub flush_interval_secs: u64,

    #[arg(long, env = QUEUE_CAPACITY_ENV, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    #[arg(long, env = SHUTDOWN_GRACE_ENV, default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    pub shutdown_grace_secs: u64,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a single URL.
    Shorten {
        #[arg(long)]
        owner: String,
        url: String,
    },
    /// Shorten several URLs, each given as `CORRELATION_ID=URL`.
    Batch {
        #[arg(long)]
        owner: String,
        #[arg(required = true, value_parser = parse_batch_item)]
        items: Vec<BatchItem>,
    },
    /// Print the URL behind a short code.
    Resolve { code: ShortCode },
    /// List the URLs created by an owner.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Delete short codes owned by `owner`. Applied when the queue flushes.
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        codes: Vec<ShortCode>,
    },
    /// Print record and owner counts.
    Stats,
    /// Check that the storage backend is reachable.
    Ping,
}

impl CLI {
    pub fn store_config(&self) -> anyhow::Result<StoreConfig> {
        Ok(match self.storage {
            StorageBackendArg::InMemory => StoreConfig::InMemory,
            StorageBackendArg::File => StoreConfig::File {
                path: self.file_storage_path.clone(),
            },
            StorageBackendArg::Postgres => {
                let dsn = self
                    .database_dsn
                    .clone()
                    .context("database dsn is required when storage backend is postgres")?;
                StoreConfig::Postgres(PostgresSettings::builder().dsn(dsn).build())
            }
        })
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings::builder()
            .flush_interval(Duration::from_secs(self.flush_interval_secs.max(1)))
            .capacity(self.queue_capacity.max(1))
            .build()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_batch_item(value: &str) -> Result<BatchItem, String> {
    let (correlation_id, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected CORRELATION_ID=URL, got '{value}'"))?;
    if correlation_id.is_empty() {
        return Err(format!("missing correlation id in '{value}'"));
    }
    Ok(BatchItem::new(correlation_id, url))
}
