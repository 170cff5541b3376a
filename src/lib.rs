//! `paracopy`: a parallel file-copy engine for high-latency, high-bandwidth
//! storage links where sequential copying cannot saturate bandwidth.
//!
//! The engine copies a single file or an entire directory tree using
//! multiple concurrent files and multiple concurrent read/write streams
//! per file, admission-controlled by three intersecting concurrency
//! budgets. See [`engine::CopyEngine`] for the entry point.

pub mod budget;
pub mod cancel;
pub mod chunk_worker;
pub mod cli;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod events;
pub mod file_copier;
pub mod options;
pub mod stats;
pub mod walker;

pub use cancel::CancellationToken;
pub use engine::CopyEngine;
pub use error::{CopyError, Result};
pub use events::{EventEmitter, Sink, VerboseEvent, VerboseLevel};
pub use file_copier::CopyJob;
pub use options::{Options, PathType};
pub use walker::Mask;
