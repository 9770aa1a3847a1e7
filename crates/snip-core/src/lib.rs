//! Core types and traits for the snip URL shortener.
//!
//! This crate holds the record model, the [`UrlStore`] contract every storage
//! backend implements, and the error taxonomy shared by the storage and
//! shortener crates.

pub mod error;
pub mod shortcode;
pub mod store;

pub use error::{CoreError, Result, StorageError};
pub use shortcode::ShortCode;
pub use store::{DeleteUrlsTask, InternalStats, SaveUrl, ShortenedUrl, UrlStore};
