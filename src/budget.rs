//! Admission gates: three counting semaphores plus one mutual-exclusion
//! gate, shared by reference between the engine, `FileCopier`, and
//! `ChunkWorker` for the duration of one operation.
//!
//! `SharedSemaphore` is a `Clone`-able, `Arc`-backed handle around
//! `compio_sync::Semaphore` so the same gate can be held by many
//! concurrently-running tasks.

use compio_sync::{Semaphore, SemaphorePermit};
use std::sync::Arc;

/// A cheaply-cloneable counting semaphore.
#[derive(Clone)]
pub struct SharedSemaphore {
    inner: Arc<Semaphore>,
}

impl SharedSemaphore {
    /// Create a gate with `permits` capacity.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Acquire one permit, suspending until one is available. This is the
    /// engine's only cooperative-yield point for admission control.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.inner.acquire().await
    }

    /// Permits currently available (diagnostic use only; never branch
    /// copy correctness on this value, since it can change the instant
    /// after it's read).
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.inner.available_permits()
    }

    /// Total capacity of this gate.
    #[must_use]
    pub fn max_permits(&self) -> usize {
        self.inner.max_permits()
    }

    /// Acquire one permit whose release is not tied to a borrow of this
    /// handle, so it can travel into a spawned task and be dropped from
    /// there (e.g. `G_queue`'s permit, held by the walker at acquisition
    /// time but released only once the corresponding `FileCopier`
    /// terminates, possibly on a different task).
    pub async fn acquire_owned(&self) -> OwnedPermit {
        let borrowed = self.inner.acquire().await;
        std::mem::forget(borrowed);
        OwnedPermit {
            semaphore: self.clone(),
        }
    }
}

/// A permit acquired via [`SharedSemaphore::acquire_owned`]. Releases its
/// slot back to the semaphore when dropped, regardless of which task drops
/// it.
pub struct OwnedPermit {
    semaphore: SharedSemaphore,
}

impl Drop for OwnedPermit {
    fn drop(&mut self) {
        self.semaphore.inner.add_permits(1);
    }
}

/// The four admission primitives of the concurrency model, grouped so the
/// engine, `FileCopier`, and `ChunkWorker` each receive exactly the subset
/// they need.
///
/// Acquisition order for a single file (must be observed to avoid
/// deadlock): `file` -> `thread_safety` -> `thread` x k -> release
/// `thread_safety` -> copy -> release `thread` x k, `file` in reverse
/// order on exit.
#[derive(Clone)]
pub struct BudgetGuards {
    /// Capacity `max_concurrent_files`; held for the lifetime of one
    /// `FileCopier`.
    pub file: SharedSemaphore,
    /// Capacity `max_file_queue_length`; acquired by the walker before
    /// enqueueing a job, released when the corresponding `FileCopier`
    /// terminates.
    pub queue: SharedSemaphore,
    /// Capacity `max_total_threads`; acquired `k` times by a single
    /// `FileCopier`, released in `k` increments on completion.
    pub thread: SharedSemaphore,
    /// Capacity 1. Held across the entire block in which a `FileCopier`
    /// acquires its `k` `thread` permits, so that at most one file is
    /// accumulating permits at any moment. Without this, two files could
    /// each acquire some but not all of `max_total_threads` and deadlock
    /// with neither able to progress.
    pub thread_safety: SharedSemaphore,
}

impl BudgetGuards {
    /// Build the four gates from an [`crate::options::Options`] value.
    #[must_use]
    pub fn new(options: &crate::options::Options) -> Self {
        Self {
            file: SharedSemaphore::new(options.max_concurrent_files),
            queue: SharedSemaphore::new(options.max_file_queue_length),
            thread: SharedSemaphore::new(options.max_total_threads),
            thread_safety: SharedSemaphore::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    #[test]
    fn gates_reflect_option_capacities() {
        let opts = Options {
            max_concurrent_files: 7,
            max_file_queue_length: 9,
            max_total_threads: 3,
            ..Options::default()
        };
        let guards = BudgetGuards::new(&opts);
        assert_eq!(guards.file.max_permits(), 7);
        assert_eq!(guards.queue.max_permits(), 9);
        assert_eq!(guards.thread.max_permits(), 3);
        assert_eq!(guards.thread_safety.max_permits(), 1);
    }

    #[compio::test]
    async fn thread_safety_is_a_mutex() {
        let gate = SharedSemaphore::new(1);
        let _permit = gate.acquire().await;
        assert_eq!(gate.available_permits(), 0);
    }

    #[compio::test]
    async fn acquiring_k_thread_permits_drains_capacity() {
        let thread = SharedSemaphore::new(4);
        let mut permits = Vec::new();
        for _ in 0..3 {
            permits.push(thread.acquire().await);
        }
        assert_eq!(thread.available_permits(), 1);
        drop(permits);
        assert_eq!(thread.available_permits(), 4);
    }

    #[compio::test]
    async fn owned_permit_outlives_the_handle_it_was_acquired_from() {
        let queue = SharedSemaphore::new(1);
        let permit = queue.acquire_owned().await;
        assert_eq!(queue.available_permits(), 0);
        // Simulate the permit traveling into a spawned task: only the
        // clone survives here, the original handle is gone.
        drop(queue.clone());
        drop(permit);
        assert_eq!(queue.available_permits(), 1);
    }
}
