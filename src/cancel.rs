//! Cooperative cancellation token.
//!
//! Modeled as a broadcast flag observed at every await point (semaphore
//! acquisition, positioned I/O, staging-file resize, rename/delete, and the
//! top of every chunk loop) rather than as a future that resolves on
//! cancellation — the engine never needs to race against cancellation, it
//! only needs to check it between steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply-cloneable cancellation flag shared by one `copy`/`copy_file`
/// invocation and every task it dispatches.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
