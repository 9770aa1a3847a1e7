use async_trait::async_trait;
use snip_core::{
    DeleteUrlsTask, InternalStats, Result, SaveUrl, ShortCode, ShortenedUrl, StorageError,
    UrlStore,
};
use sqlx::postgres::{PgDatabaseError, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, trace};
use typed_builder::TypedBuilder;

/// Schema applied by [`PostgresStore::connect`]. Every statement is idempotent.
pub const SCHEMA: &str = include_str!("../ddl/postgres/shorten_url.sql");

/// Rows per multi-row insert, keeping the bind count well below the protocol
/// limit of 65535 parameters.
const INSERT_CHUNK: usize = 1000;

/// Connection settings for [`PostgresStore`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PostgresSettings {
    #[builder(setter(into))]
    pub dsn: String,
    #[builder(default = 10)]
    pub max_connections: u32,
    #[builder(default = Duration::from_secs(5))]
    pub acquire_timeout: Duration,
}

/// PostgreSQL implementation of [`UrlStore`].
///
/// Uniqueness of both `short_url` and `original_url` is enforced by unique
/// indexes, so concurrent writers from any number of processes stay
/// consistent. Soft delete flips `is_deleted`; rows are never removed.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing pool. The schema must already exist.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and creates the schema if it is missing.
    pub async fn connect(settings: &PostgresSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(&settings.dsn)
            .await
            .map_err(map_sqlx_error)?;

        let store = Self::new(pool);
        store.bootstrap().await?;
        info!(max_connections = settings.max_connections, "connected to postgres");
        Ok(store)
    }

    /// Applies [`SCHEMA`].
    pub async fn bootstrap(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

/// Extracts the value from a unique violation detail such as
/// `Key (short_url)=(abc123) already exists.`
fn violated_key(detail: &str) -> Option<&str> {
    let (_, rest) = detail.split_once(")=(")?;
    let (value, _) = rest.rsplit_once(") already exists")?;
    Some(value)
}

/// Returns the short code named by a unique violation, falling back to the
/// codes proposed in the failed statement.
fn conflicting_code(err: &sqlx::Error, proposed: &[SaveUrl]) -> String {
    err.as_database_error()
        .and_then(|db| db.try_downcast_ref::<PgDatabaseError>())
        .and_then(PgDatabaseError::detail)
        .and_then(violated_key)
        .map(str::to_string)
        .unwrap_or_else(|| {
            proposed
                .iter()
                .map(|request| request.short_code.as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn record_from_row(row: &PgRow) -> Result<ShortenedUrl> {
    let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;

    Ok(ShortenedUrl {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        short_code: ShortCode::new_unchecked(short_url),
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        owner_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        is_deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

fn count(row: &PgRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column).map_err(map_sqlx_error)?;
    u64::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("negative {column} count: {value}")))
}

#[async_trait]
impl UrlStore for PostgresStore {
    async fn save_url(&self, request: SaveUrl) -> Result<ShortenedUrl> {
        // The no-op update makes RETURNING yield the existing row on a
        // duplicate original url; `xmax = 0` only holds for a fresh insert.
        let result = sqlx::query(
            r#"
            INSERT INTO shorten_url (short_url, original_url, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (original_url)
            DO UPDATE SET original_url = EXCLUDED.original_url
            RETURNING id, short_url, original_url, user_id, is_deleted, (xmax = 0) AS inserted
            "#,
        )
        .bind(request.short_code.as_str())
        .bind(&request.original_url)
        .bind(&request.owner_id)
        .fetch_one(&self.pool)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::ShortUrlConflict(request.short_code.into_string()))
            }
            Err(err) => return Err(map_sqlx_error(err)),
        };

        let record = record_from_row(&row)?;
        let inserted: bool = row.try_get("inserted").map_err(map_sqlx_error)?;

        if inserted {
            trace!(code = %record.short_code, id = record.id, "inserted url");
            Ok(record)
        } else {
            debug!(code = %record.short_code, "original url already stored");
            Err(StorageError::url_conflict(record))
        }
    }

    async fn save_several_urls(&self, requests: Vec<SaveUrl>) -> Result<Vec<ShortenedUrl>> {
        let mut seen = HashSet::new();
        let requests: Vec<SaveUrl> = requests
            .into_iter()
            .filter(|request| seen.insert(request.original_url.clone()))
            .collect();

        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let originals: Vec<String> = requests
            .iter()
            .map(|request| request.original_url.clone())
            .collect();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for chunk in requests.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO shorten_url (short_url, original_url, user_id) ");
            builder.push_values(chunk, |mut row, request| {
                row.push_bind(request.short_code.as_str().to_owned())
                    .push_bind(request.original_url.clone())
                    .push_bind(request.owner_id.clone());
            });
            builder.push(" ON CONFLICT (original_url) DO NOTHING");

            match builder.build().execute(&mut *tx).await {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    return Err(StorageError::ShortUrlConflict(conflicting_code(&err, chunk)));
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT id, short_url, original_url, user_id, is_deleted
            FROM shorten_url
            WHERE original_url = ANY($1)
            "#,
        )
        .bind(&originals)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;
        trace!(count = records.len(), "saved url batch");
        Ok(records)
    }

    async fn get_by_short_url(&self, code: &ShortCode) -> Result<ShortenedUrl> {
        let row = sqlx::query(
            r#"
            SELECT id, short_url, original_url, user_id, is_deleted
            FROM shorten_url
            WHERE short_url = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StorageError::NotFound(code.to_string())),
        }
    }

    async fn get_urls_by_user_id(&self, owner_id: &str) -> Result<Vec<ShortenedUrl>> {
        let rows = sqlx::query(
            r#"
            SELECT id, short_url, original_url, user_id, is_deleted
            FROM shorten_url
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn delete_by_short_urls(&self, codes: &[ShortCode], owner_id: &str) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let codes: Vec<&str> = codes.iter().map(ShortCode::as_str).collect();
        let result = sqlx::query(
            r#"
            UPDATE shorten_url
            SET is_deleted = TRUE
            WHERE short_url = ANY($1)
              AND user_id = $2
              AND NOT is_deleted
            "#,
        )
        .bind(&codes)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(
            owner = %owner_id,
            requested = codes.len(),
            deleted = result.rows_affected(),
            "soft-deleted urls"
        );
        Ok(())
    }

    async fn do_delete_url_tasks(&self, tasks: &[DeleteUrlsTask]) -> Result<()> {
        let (codes, owners): (Vec<&str>, Vec<&str>) = tasks
            .iter()
            .flat_map(|task| {
                task.short_codes
                    .iter()
                    .map(move |code| (code.as_str(), task.owner_id.as_str()))
            })
            .unzip();

        if codes.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE shorten_url AS s
            SET is_deleted = TRUE
            FROM unnest($1::text[], $2::text[]) AS t(short_url, user_id)
            WHERE s.short_url = t.short_url
              AND s.user_id = t.user_id
              AND NOT s.is_deleted
            "#,
        )
        .bind(&codes)
        .bind(&owners)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(
            tasks = tasks.len(),
            deleted = result.rows_affected(),
            "applied delete tasks"
        );
        Ok(())
    }

    async fn internal_stats(&self) -> Result<InternalStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT user_id) AS users
            FROM shorten_url
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(InternalStats {
            urls: count(&row, "urls")?,
            users: count(&row, "users")?,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
