use crate::error::QueueError;
use parking_lot::Mutex;
use snip_core::{DeleteUrlsTask, UrlStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use typed_builder::TypedBuilder;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CAPACITY: usize = 3;
/// Shortest period the consumer ticks at; zero is raised to this.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, TypedBuilder)]
pub struct QueueSettings {
    /// Time between two periodic flushes.
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    /// Tasks the channel holds before `push` starts waiting.
    #[builder(default = DEFAULT_CAPACITY)]
    pub capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Running,
    Stopped,
}

/// The parts handed over to the consumer task on start.
struct Consumer {
    receiver: mpsc::Receiver<DeleteUrlsTask>,
    state: watch::Sender<QueueState>,
}

/// Bounded queue of deletion requests drained by a single consumer.
///
/// Producers call [`DeletionQueue::push`] from anywhere. The consumer buffers
/// what it receives and applies the whole buffer with one
/// [`UrlStore::do_delete_url_tasks`] call on every tick of the flush interval,
/// then once more when the shutdown future resolves.
///
/// Deletion is fire-and-forget: a failed flush is logged and the batch is
/// dropped, so producers never learn the outcome.
pub struct DeletionQueue {
    sender: mpsc::Sender<DeleteUrlsTask>,
    consumer: Mutex<Option<Consumer>>,
    state: watch::Receiver<QueueState>,
    store: Arc<dyn UrlStore>,
    settings: QueueSettings,
}

impl DeletionQueue {
    /// Creates an idle queue. A zero capacity is raised to one and the flush
    /// interval to at least [`MIN_FLUSH_INTERVAL`].
    pub fn new(store: Arc<dyn UrlStore>, settings: QueueSettings) -> Self {
        let settings = QueueSettings {
            flush_interval: settings.flush_interval.max(MIN_FLUSH_INTERVAL),
            capacity: settings.capacity.max(1),
        };
        let (sender, receiver) = mpsc::channel(settings.capacity);
        let (state_tx, state) = watch::channel(QueueState::Idle);

        Self {
            sender,
            consumer: Mutex::new(Some(Consumer {
                receiver,
                state: state_tx,
            })),
            state,
            store,
            settings,
        }
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    /// Enqueues a task, waiting while the queue is full.
    ///
    /// Returns [`QueueError::Closed`] once the consumer has stopped.
    pub async fn push(&self, task: DeleteUrlsTask) -> Result<(), QueueError> {
        self.sender.send(task).await.map_err(|_| QueueError::Closed)
    }

    /// Spawns the consumer. It runs until `shutdown` resolves, then drains the
    /// channel, flushes one last time and stops.
    ///
    /// Must be called from within a tokio runtime. Only the first call
    /// succeeds; later ones return [`QueueError::AlreadyStarted`].
    pub fn start<F>(&self, shutdown: F) -> Result<DeletionWorker, QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let consumer = self
            .consumer
            .lock()
            .take()
            .ok_or(QueueError::AlreadyStarted)?;
        consumer.state.send_replace(QueueState::Running);

        info!(
            flush_interval = ?self.settings.flush_interval,
            capacity = self.settings.capacity,
            "deletion queue started"
        );

        let handle = tokio::spawn(consume(
            consumer,
            Arc::clone(&self.store),
            self.settings.flush_interval,
            shutdown,
        ));

        Ok(DeletionWorker { handle })
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Handle to a running consumer.
#[derive(Debug)]
pub struct DeletionWorker {
    handle: JoinHandle<()>,
}

impl DeletionWorker {
    /// Waits for the consumer to finish its final flush, at most `grace`.
    ///
    /// On timeout the consumer is left running detached; the caller decides
    /// whether to exit anyway.
    pub async fn join(self, grace: Duration) -> Result<(), QueueError> {
        match time::timeout(grace, self.handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(QueueError::Join(err.to_string())),
            Err(_) => Err(QueueError::ShutdownTimedOut(grace)),
        }
    }
}

async fn consume<F>(
    consumer: Consumer,
    store: Arc<dyn UrlStore>,
    flush_interval: Duration,
    shutdown: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    let Consumer {
        mut receiver,
        state,
    } = consumer;
    let mut buffer = Vec::new();

    let mut ticker = time::interval_at(Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("deletion queue received shutdown");
                break;
            }
            task = receiver.recv() => match task {
                Some(task) => buffer.push(task),
                None => {
                    debug!("all deletion queue producers are gone");
                    break;
                }
            },
            _ = ticker.tick() => flush(store.as_ref(), &mut buffer).await,
        }
    }

    receiver.close();
    while let Ok(task) = receiver.try_recv() {
        buffer.push(task);
    }
    flush(store.as_ref(), &mut buffer).await;

    state.send_replace(QueueState::Stopped);
    info!("deletion queue stopped");
}

/// Applies and clears the buffer. The buffer is cleared whatever the outcome.
async fn flush(store: &dyn UrlStore, buffer: &mut Vec<DeleteUrlsTask>) {
    if buffer.is_empty() {
        return;
    }

    let tasks = std::mem::take(buffer);
    match store.do_delete_url_tasks(&tasks).await {
        Ok(()) => info!(count = tasks.len(), "flushed delete tasks"),
        Err(err) => error!(count = tasks.len(), error = %err, "failed to flush delete tasks"),
    }
}
