//! Watcher progress state
//!
//! Block-number cursors published by a long-running loop and read by
//! readiness checks on other tasks.

pub mod progress;

pub use progress::WatcherProgress;
