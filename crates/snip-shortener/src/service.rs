use crate::error::ShortenerError;
use crate::queue::DeletionQueue;
use serde::Serialize;
use snip_core::{
    DeleteUrlsTask, InternalStats, SaveUrl, ShortCode, ShortenedUrl, StorageError, UrlStore,
};
use snip_generator::Generator;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum Shortened {
    /// A new mapping was stored.
    Created(ShortenedUrl),
    /// The URL was already shortened; this is the record that owns it.
    Existing(ShortenedUrl),
}

impl Shortened {
    pub fn record(&self) -> &ShortenedUrl {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> ShortenedUrl {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// One entry of a batch shortening request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Opaque token echoed back in the matching [`BatchResult`].
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchItem {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub record: ShortenedUrl,
}

/// The operations handlers call.
///
/// The service owns no state of its own: records live in the store, and
/// deletions are handed to the shared [`DeletionQueue`], whose lifecycle is
/// managed by the caller.
pub struct ShortenerService<G> {
    store: Arc<dyn UrlStore>,
    generator: Arc<G>,
    queue: Arc<DeletionQueue>,
}

impl<G> Clone for ShortenerService<G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<G: Generator> ShortenerService<G> {
    pub fn new(store: Arc<dyn UrlStore>, generator: G, queue: Arc<DeletionQueue>) -> Self {
        Self {
            store,
            generator: Arc::new(generator),
            queue,
        }
    }

    /// Validates that the URL has a valid format (has a scheme and host).
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };
        if scheme.is_empty() || rest.is_empty() {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        }

        let scheme = scheme.to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        Ok(())
    }

    /// Produces a candidate short code. Uniqueness is checked by the store.
    pub fn generate(&self) -> ShortCode {
        self.generator.generate().into()
    }

    /// Shortens a URL on behalf of `owner_id`.
    ///
    /// A URL that is already stored, deleted or not, yields
    /// [`Shortened::Existing`] with the stored record. A short code collision
    /// is retried once with a fresh code.
    pub async fn shorten(
        &self,
        original_url: &str,
        owner_id: &str,
    ) -> Result<Shortened, ShortenerError> {
        Self::validate_url(original_url)?;

        let mut retried = false;
        loop {
            let request = SaveUrl::new(original_url, self.generate(), owner_id);

            match self.store.save_url(request).await {
                Ok(record) => {
                    info!(code = %record.short_code, owner = %owner_id, "shortened url");
                    return Ok(Shortened::Created(record));
                }
                Err(StorageError::UrlConflict(existing)) => {
                    debug!(code = %existing.short_code, "url already shortened");
                    return Ok(Shortened::Existing(*existing));
                }
                Err(StorageError::ShortUrlConflict(code)) if !retried => {
                    warn!(code = %code, "short code collision, regenerating");
                    retried = true;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Shortens several URLs in one store call.
    ///
    /// Results come back in input order, one per distinct URL. When the same
    /// URL appears more than once, the last correlation id wins.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        owner_id: &str,
    ) -> Result<Vec<BatchResult>, ShortenerError> {
        for item in &items {
            Self::validate_url(&item.original_url)?;
        }

        let mut order = Vec::new();
        let mut correlations = HashMap::new();
        for item in items {
            if !correlations.contains_key(&item.original_url) {
                order.push(item.original_url.clone());
            }
            correlations.insert(item.original_url, item.correlation_id);
        }

        if order.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.save_batch(&order, owner_id).await?;
        let mut by_url: HashMap<String, ShortenedUrl> = records
            .into_iter()
            .map(|record| (record.original_url.clone(), record))
            .collect();

        let mut results = Vec::with_capacity(order.len());
        for url in order {
            let (Some(record), Some(correlation_id)) =
                (by_url.remove(&url), correlations.remove(&url))
            else {
                warn!(url = %url, "store returned no record for batch url");
                continue;
            };
            results.push(BatchResult {
                correlation_id,
                record,
            });
        }

        info!(count = results.len(), owner = %owner_id, "shortened url batch");
        Ok(results)
    }

    async fn save_batch(
        &self,
        urls: &[String],
        owner_id: &str,
    ) -> Result<Vec<ShortenedUrl>, ShortenerError> {
        let build = || -> Vec<SaveUrl> {
            urls.iter()
                .map(|url| SaveUrl::new(url.as_str(), self.generate(), owner_id))
                .collect()
        };

        match self.store.save_several_urls(build()).await {
            Err(StorageError::ShortUrlConflict(code)) => {
                warn!(code = %code, "short code collision in batch, regenerating");
                Ok(self.store.save_several_urls(build()).await?)
            }
            other => Ok(other?),
        }
    }

    /// Looks up the record behind a short code.
    ///
    /// Returns [`ShortenerError::Deleted`] when the record exists but has been
    /// soft-deleted.
    pub async fn resolve(&self, code: &ShortCode) -> Result<ShortenedUrl, ShortenerError> {
        let record = self.store.get_by_short_url(code).await?;
        if record.is_deleted {
            return Err(ShortenerError::Deleted(code.to_string()));
        }
        Ok(record)
    }

    pub async fn user_urls(&self, owner_id: &str) -> Result<Vec<ShortenedUrl>, ShortenerError> {
        Ok(self.store.get_urls_by_user_id(owner_id).await?)
    }

    /// Schedules deletion of `codes` on behalf of `owner_id`.
    ///
    /// Returns once the request is queued; the deletion is applied on the
    /// next flush. Codes the owner does not own are ignored at that point.
    pub async fn delete_urls(
        &self,
        owner_id: &str,
        codes: Vec<ShortCode>,
    ) -> Result<(), ShortenerError> {
        if codes.is_empty() {
            return Ok(());
        }

        let count = codes.len();
        self.queue.push(DeleteUrlsTask::new(owner_id, codes)).await?;
        debug!(owner = %owner_id, count, "queued url deletion");
        Ok(())
    }

    pub async fn internal_stats(&self) -> Result<InternalStats, ShortenerError> {
        Ok(self.store.internal_stats().await?)
    }

    pub async fn ping(&self) -> Result<(), ShortenerError> {
        Ok(self.store.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueSettings;
    use parking_lot::Mutex;
    use snip_generator::SeqGenerator;
    use snip_storage::InMemoryStore;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Hands out a fixed list of codes, then falls back to a sequence.
    struct ScriptedGenerator {
        script: Mutex<VecDeque<&'static str>>,
        fallback: SeqGenerator,
    }

    impl ScriptedGenerator {
        fn new(script: &[&'static str]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                fallback: SeqGenerator::with_prefix("gen"),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        type Output = ShortCode;

        fn generate(&self) -> ShortCode {
            match self.script.lock().pop_front() {
                Some(code) => ShortCode::new_unchecked(code),
                None => self.fallback.generate(),
            }
        }
    }

    fn service_with<G: Generator>(generator: G) -> (ShortenerService<G>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(DeletionQueue::new(
            Arc::clone(&store) as Arc<dyn UrlStore>,
            QueueSettings::default(),
        ));
        let service = ShortenerService::new(store.clone() as Arc<dyn UrlStore>, generator, queue);
        (service, store)
    }

    fn test_service() -> (ShortenerService<SeqGenerator>, Arc<InMemoryStore>) {
        service_with(SeqGenerator::with_prefix("sn"))
    }

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    #[tokio::test]
    async fn shorten_creates_record() {
        let (service, _) = test_service();

        let shortened = service.shorten("https://example.com", "u1").await.unwrap();

        assert!(shortened.is_created());
        assert_eq!(shortened.record().short_code.as_str(), "sn000000");
        assert_eq!(shortened.record().owner_id, "u1");
    }

    #[tokio::test]
    async fn shorten_same_url_returns_existing() {
        let (service, store) = test_service();

        let first = service.shorten("https://example.com", "u1").await.unwrap();
        let second = service.shorten("https://example.com", "u2").await.unwrap();

        assert_eq!(second, Shortened::Existing(first.into_record()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn shorten_rejects_invalid_urls() {
        let (service, _) = test_service();

        for url in ["", "not-a-valid-url", "ftp://example.com", "https://", "://x"] {
            let err = service.shorten(url, "u1").await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn shorten_retries_once_on_collision() {
        let (service, _) = service_with(ScriptedGenerator::new(&["taken1", "taken1", "fresh1"]));

        service.shorten("https://a.com", "u1").await.unwrap();
        let second = service.shorten("https://b.com", "u1").await.unwrap();

        assert!(second.is_created());
        assert_eq!(second.record().short_code.as_str(), "fresh1");
    }

    #[tokio::test]
    async fn shorten_gives_up_after_second_collision() {
        let (service, store) =
            service_with(ScriptedGenerator::new(&["taken1", "taken1", "taken1"]));

        service.shorten("https://a.com", "u1").await.unwrap();
        let err = service.shorten("https://b.com", "u1").await.unwrap_err();

        assert!(matches!(err, ShortenerError::ShortCodeConflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn batch_correlates_results_in_input_order() {
        let (service, store) = test_service();
        let existing = service.shorten("https://a.com", "u1").await.unwrap();

        let results = service
            .shorten_batch(
                vec![
                    BatchItem::new("c1", "https://b.com"),
                    BatchItem::new("c2", "https://a.com"),
                    BatchItem::new("c3", "https://c.com"),
                ],
                "u2",
            )
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.correlation_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(results[0].record.original_url, "https://b.com");
        assert_eq!(&results[1].record, existing.record());
        assert_eq!(results[2].record.owner_id, "u2");
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn batch_duplicate_url_keeps_last_correlation() {
        let (service, store) = test_service();

        let results = service
            .shorten_batch(
                vec![
                    BatchItem::new("first", "https://a.com"),
                    BatchItem::new("second", "https://a.com"),
                ],
                "u1",
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].correlation_id, "second");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn batch_retries_once_on_collision() {
        let (service, store) =
            service_with(ScriptedGenerator::new(&["taken1", "taken1", "okay01"]));
        service.shorten("https://a.com", "u1").await.unwrap();

        let results = service
            .shorten_batch(vec![BatchItem::new("c1", "https://b.com")], "u1")
            .await
            .unwrap();

        assert_eq!(results[0].record.short_code.as_str(), "okay01");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn batch_with_invalid_url_stores_nothing() {
        let (service, store) = test_service();

        let err = service
            .shorten_batch(
                vec![
                    BatchItem::new("c1", "https://a.com"),
                    BatchItem::new("c2", "mailto:x@y.z"),
                ],
                "u1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShortenerError::InvalidUrl(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let (service, _) = test_service();
        assert!(service.shorten_batch(Vec::new(), "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_reports_missing_and_deleted() {
        let (service, store) = test_service();
        let created = service.shorten("https://a.com", "u1").await.unwrap();
        let code = created.record().short_code.clone();

        assert_eq!(service.resolve(&code).await.unwrap().original_url, "https://a.com");
        assert!(matches!(
            service.resolve(&ShortCode::new_unchecked("nope01")).await,
            Err(ShortenerError::NotFound(_))
        ));

        store
            .delete_by_short_urls(std::slice::from_ref(&code), "u1")
            .await
            .unwrap();
        assert!(matches!(
            service.resolve(&code).await,
            Err(ShortenerError::Deleted(_))
        ));
    }

    #[tokio::test]
    async fn user_urls_and_stats() {
        let (service, _) = test_service();
        service.shorten("https://a.com", "u1").await.unwrap();
        service.shorten("https://b.com", "u2").await.unwrap();
        service.shorten("https://c.com", "u1").await.unwrap();

        assert_eq!(service.user_urls("u1").await.unwrap().len(), 2);
        assert!(service.user_urls("u3").await.unwrap().is_empty());
        assert_eq!(
            service.internal_stats().await.unwrap(),
            InternalStats { urls: 3, users: 2 }
        );
        service.ping().await.unwrap();
    }

    #[tokio::test]
    async fn delete_after_queue_stopped_reports_closed() {
        let (service, _) = test_service();

        let worker = service.queue.start(async {}).unwrap();
        worker.join(Duration::from_secs(60)).await.unwrap();

        let err = service
            .delete_urls("u1", vec![code("abc123")])
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::QueueClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_shorten_delete_resolve() {
        let (service, _) = service_with(ScriptedGenerator::new(&["abc123"]));
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let worker = service
            .queue
            .start(async move {
                let _ = stopped.await;
            })
            .unwrap();

        let created = service.shorten("https://a.com", "u1").await.unwrap();
        assert_eq!(created.record().short_code.as_str(), "abc123");

        let again = service.shorten("https://a.com", "u1").await.unwrap();
        assert_eq!(again, Shortened::Existing(created.record().clone()));

        let batch = service
            .shorten_batch(
                vec![
                    BatchItem::new("x", "https://a.com"),
                    BatchItem::new("y", "https://b.com"),
                ],
                "u1",
            )
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].correlation_id, "x");
        assert_eq!(batch[0].record.short_code.as_str(), "abc123");
        assert_eq!(batch[1].correlation_id, "y");
        assert_eq!(
            service.internal_stats().await.unwrap(),
            InternalStats { urls: 2, users: 1 }
        );

        service.delete_urls("u1", vec![code("abc123")]).await.unwrap();
        assert!(service.resolve(&code("abc123")).await.is_ok());

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert!(matches!(
            service.resolve(&code("abc123")).await,
            Err(ShortenerError::Deleted(_))
        ));

        stop.send(()).unwrap();
        worker.join(Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_applies_queued_deletions() {
        let (service, _) = test_service();
        let created = service.shorten("https://a.com", "u1").await.unwrap();
        let code = created.record().short_code.clone();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let worker = service
            .queue
            .start(async move {
                let _ = stopped.await;
            })
            .unwrap();

        service.delete_urls("u2", vec![code.clone()]).await.unwrap();
        service.delete_urls("u1", vec![code.clone()]).await.unwrap();
        stop.send(()).unwrap();
        worker.join(Duration::from_secs(60)).await.unwrap();

        assert!(matches!(
            service.resolve(&code).await,
            Err(ShortenerError::Deleted(_))
        ));
    }
}
