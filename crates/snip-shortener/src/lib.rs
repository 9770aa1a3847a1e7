//! URL shortener service and the batched deletion queue.
//!
//! [`ShortenerService`] is the entry point handlers call. Deletions are not
//! applied inline: they go through [`DeletionQueue`], whose single consumer
//! flushes them to the store on a timer and once more on shutdown.

pub mod error;
pub mod queue;
pub mod service;

pub use error::{QueueError, ShortenerError};
pub use queue::{DeletionQueue, DeletionWorker, QueueSettings, QueueState};
pub use service::{BatchItem, BatchResult, Shortened, ShortenerService};
