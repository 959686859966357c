//! post-archiver domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `extract`: Content extraction and text normalization
//! - `watermark`: Per-account high-water mark for deduplication
//! - `usecases`: Application use cases / business logic

pub mod extract;
pub mod model;
pub mod ports;
pub mod usecases;
pub mod watermark;

pub use model::*;
pub use ports::*;
pub use watermark::Watermark;
