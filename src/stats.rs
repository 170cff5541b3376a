//! Engine-scoped progress counters.
//!
//! Every field is a plain atomic; `Ordering::Relaxed` is sufficient since
//! these counters carry no cross-field invariant that requires
//! synchronization.
//! Reset once per `copy`/`copy_file` call while the operation gate is held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonically nondecreasing progress counters for one copy operation.
#[derive(Debug)]
pub struct FileProgress {
    copied_file_count: AtomicU64,
    copied_byte_count: AtomicU64,
    start: std::sync::Mutex<Option<Instant>>,
}

impl Default for FileProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl FileProgress {
    /// Construct a fresh, zeroed progress tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            copied_file_count: AtomicU64::new(0),
            copied_byte_count: AtomicU64::new(0),
            start: std::sync::Mutex::new(None),
        }
    }

    /// Reset all counters and start the stopwatch. Called once per
    /// `copy`/`copy_file` invocation while holding the operation gate.
    pub fn reset(&self) {
        self.copied_file_count.store(0, Ordering::Relaxed);
        self.copied_byte_count.store(0, Ordering::Relaxed);
        #[allow(clippy::unwrap_used)]
        {
            *self.start.lock().unwrap() = Some(Instant::now());
        }
    }

    /// Number of files successfully finalized so far.
    #[must_use]
    pub fn copied_file_count(&self) -> u64 {
        self.copied_file_count.load(Ordering::Relaxed)
    }

    /// Number of bytes actually read and written so far.
    #[must_use]
    pub fn copied_byte_count(&self) -> u64 {
        self.copied_byte_count.load(Ordering::Relaxed)
    }

    /// Increment the finalized-file counter by exactly one.
    pub fn increment_files(&self) {
        self.copied_file_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `bytes` to the byte counter. Called once per chunk write.
    pub fn add_bytes(&self, bytes: u64) {
        self.copied_byte_count.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Elapsed time since the last [`reset`](Self::reset), or zero if never
    /// started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        #[allow(clippy::unwrap_used)]
        self.start
            .lock()
            .unwrap()
            .map_or(std::time::Duration::ZERO, |s| s.elapsed())
    }
}
