//! Application use cases

pub mod monitor;

pub use monitor::{CycleError, CycleReport, FeedMonitor};
