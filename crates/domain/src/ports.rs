//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{ArchivedPost, RawPost};

/// Error type for feed fetch operations.
///
/// All variants are recoverable: the cycle that hit them no-ops and the
/// supervisor retries on the next tick.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Port for fetching the current timeline of a monitored account.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the account's recent posts, newest first.
    ///
    /// An `Ok` with an empty list is a successful fetch; `Err` signals a
    /// recoverable transport failure.
    async fn fetch_timeline(&self, user_id: &str) -> Result<Vec<RawPost>, FeedError>;
}

/// Error type for sink write operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for persisting normalized records.
///
/// Two interchangeable backends implement this: a SQLite document store and
/// a one-file-per-post directory layout. The variant is chosen once at
/// construction; the monitor only sees the `write` capability.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Persist one record. At-least-once: a caller may replay a record the
    /// sink has already seen after a crash.
    async fn write(&self, post: &ArchivedPost) -> Result<(), SinkError>;

    /// Backend name for logs (e.g. "sqlite", "files")
    fn backend(&self) -> &'static str;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
