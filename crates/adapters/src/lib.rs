//! post-archiver adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `feed_api`: HTTP feed source for the upstream timeline API
//! - `sink_sqlite`: SQLite document sink
//! - `sink_files`: one-file-per-post sink
//! - `state_file`: durable per-account monitor state

mod sink_files;
mod sink_sqlite;

pub mod feed_api;
pub mod state_file;

/// Re-exports for sink adapters
pub mod sink {
    pub use crate::sink_files::FileArchive;
    pub use crate::sink_sqlite::SqliteArchive;
}

pub use feed_api::HttpFeedSource;
