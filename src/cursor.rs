//! Per-file chunk assignment and the staging-file resize serializer.

use std::sync::atomic::{AtomicI64, Ordering};

/// Monotonic chunk-index counter shared by all workers of one file.
///
/// Starts at -1 internally so the first call to [`ChunkCursor::next`]
/// returns 0; every subsequent call returns one more than the last,
/// regardless of how many workers are calling concurrently. This is what
/// guarantees exactly-once chunk assignment even with unbalanced worker
/// scheduling.
#[derive(Debug)]
pub struct ChunkCursor {
    next: AtomicI64,
}

impl Default for ChunkCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCursor {
    /// Create a cursor that will yield 0, 1, 2, ... on successive calls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(-1),
        }
    }

    /// Atomically claim the next chunk index.
    pub fn next(&self) -> u64 {
        let idx = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        #[allow(clippy::cast_sign_loss)]
        {
            idx as u64
        }
    }
}

/// Single-permit gate serializing staging-file length extension.
///
/// Concurrent `set_len` calls on the same file handle from different
/// workers are not serialized by the OS in a way that composes with later
/// positioned writes, so every extension of the staging file's length must
/// go through this gate.
pub struct ResizeGate {
    inner: crate::budget::SharedSemaphore,
}

impl Default for ResizeGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizeGate {
    /// Create a new, unheld gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: crate::budget::SharedSemaphore::new(1),
        }
    }

    /// Run `extend` while holding the gate. `extend` is expected to check
    /// the current staging-file length and grow it if needed; holding the
    /// gate across that check-then-grow is what makes it race-free.
    pub async fn guarded<F, Fut, T>(&self, extend: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _permit = self.inner.acquire().await;
        extend().await
    }
}
