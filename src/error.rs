//! Error taxonomy for the copy engine.
//!
//! Every fallible operation in the engine returns one of the tags below.
//! `Aggregate` carries the errors from two or more distinct file copies so
//! that a whole-tree operation can report all failures, not just the first.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CopyError>;

/// Taxonomic error for the copy engine.
///
/// Variants map directly onto the tags in the error handling design: a
/// caller matching on `CopyError` sees `InvalidArgument`, `NotFound`,
/// `IoRead`, `IoWrite`, `IoRename`, `IoDelete`, `IoMetadata`, `Cancelled`,
/// and `Aggregate` as distinct, stable tags.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Bad option value or contradictory src/dst path types.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A declared source directory or file is missing.
    #[error("not found: {path}")]
    NotFound {
        /// The path that could not be found.
        path: PathBuf,
    },

    /// A positioned read failed.
    #[error("read failed for {path}: {source}")]
    IoRead {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A positioned write failed.
    #[error("write failed for {path}: {source}")]
    IoWrite {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Renaming the staging file to its destination failed.
    #[error("rename failed from {from} to {to}: {source}")]
    IoRename {
        /// Staging path.
        from: PathBuf,
        /// Destination path.
        to: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Deleting an existing destination or a staging file failed.
    #[error("delete failed for {path}: {source}")]
    IoDelete {
        /// Path that could not be deleted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing metadata (timestamps, permissions, ownership)
    /// failed.
    #[error("metadata operation failed for {path}: {source}")]
    IoMetadata {
        /// Path the metadata operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Cooperative cancellation was observed. Not recorded in the error
    /// bag; surfaced to the caller as a nonzero exit only.
    #[error("operation cancelled")]
    Cancelled,

    /// Two or more errors from distinct file copies within one operation.
    #[error("{} errors occurred during copy", .0.len())]
    Aggregate(Vec<CopyError>),
}

impl CopyError {
    /// True if this variant must never be inserted into an `ErrorBag`.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, CopyError::Cancelled)
    }
}

/// Thread-safe, unordered collection of per-file copy failures.
///
/// Insertion is lock-free from the caller's perspective (a `Mutex<Vec<_>>`
/// under the hood, held only for the duration of a push); reads happen only
/// after all dispatched file copies have joined, per the propagation policy.
#[derive(Debug, Default)]
pub struct ErrorBag {
    errors: std::sync::Mutex<Vec<CopyError>>,
}

impl ErrorBag {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an error. Never insert [`CopyError::Cancelled`] here; check
    /// [`CopyError::is_cancellation`] first.
    pub fn push(&self, error: CopyError) {
        #[allow(clippy::unwrap_used)]
        self.errors.lock().unwrap().push(error);
    }

    /// True if no errors have been recorded yet. Used by scopes that must
    /// short-circuit once the bag is non-empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        #[allow(clippy::unwrap_used)]
        self.errors.lock().unwrap().is_empty()
    }

    /// Remove and return all recorded errors, resetting the bag.
    pub fn take(&self) -> Vec<CopyError> {
        #[allow(clippy::unwrap_used)]
        std::mem::take(&mut self.errors.lock().unwrap())
    }

    /// Clear the bag without returning its contents.
    pub fn clear(&self) {
        #[allow(clippy::unwrap_used)]
        self.errors.lock().unwrap().clear();
    }

    /// Collapse a list of errors into either a single `CopyError`, an
    /// `Aggregate`, or `Ok(())` if the list is empty.
    pub fn finish(mut errors: Vec<CopyError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => {
                #[allow(clippy::unwrap_used)]
                Err(errors.pop().unwrap())
            }
            _ => Err(CopyError::Aggregate(errors)),
        }
    }
}
