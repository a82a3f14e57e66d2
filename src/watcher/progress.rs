use std::sync::atomic::{AtomicU64, Ordering};

/// Start/safe block-number pair of a watcher.
///
/// Single writer (the owning loop), any number of readers. Each number is
/// an independent atomic; readers never need both to be from the same
/// update.
#[derive(Debug, Default)]
pub struct WatcherProgress {
    start_number: AtomicU64,
    safe_number: AtomicU64,
}

impl WatcherProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the watcher has processed up to
    pub fn start_number(&self) -> u64 {
        self.start_number.load(Ordering::Acquire)
    }

    pub fn set_start_number(&self, number: u64) {
        self.start_number.store(number, Ordering::Release);
    }

    /// Block up to which it is safe to process
    pub fn safe_number(&self) -> u64 {
        self.safe_number.load(Ordering::Acquire)
    }

    pub fn set_safe_number(&self, number: u64) {
        self.safe_number.store(number, Ordering::Release);
    }

    /// Caught up: the processed cursor has reached the safe cursor
    pub fn is_ready(&self) -> bool {
        self.start_number() == self.safe_number()
    }
}
