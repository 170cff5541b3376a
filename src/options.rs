//! Immutable configuration record consumed by every other component.

use crate::error::{CopyError, Result};
use std::path::PathBuf;

/// Classification of a path argument, per the rules in the walker's
/// responsibility description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    /// An existing directory, or a path ending in a path separator.
    Directory,
    /// An existing regular file (or symlink to one).
    File,
    /// Neither: the path does not exist and is not separator-terminated.
    Unknown,
}

impl PathType {
    /// Classify `path` by consulting the filesystem. Does not distinguish
    /// "does not exist" from "exists but is neither file nor directory"
    /// beyond returning `Unknown` for both, per spec.
    ///
    /// Calls `std::fs::metadata` directly and therefore blocks the calling
    /// thread; callers running on the async executor must use
    /// [`PathType::classify_async`] instead.
    #[must_use]
    pub fn classify(path: &std::path::Path) -> Self {
        let ends_with_separator = path
            .as_os_str()
            .to_string_lossy()
            .ends_with(std::path::MAIN_SEPARATOR);

        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => PathType::Directory,
            Ok(meta) if meta.is_file() => PathType::File,
            _ if ends_with_separator => PathType::Directory,
            _ => PathType::Unknown,
        }
    }

    /// Async wrapper around [`PathType::classify`] that runs the blocking
    /// `stat` call on a blocking-pool thread instead of the cooperative
    /// executor thread, so a slow path (e.g. a network mount) cannot stall
    /// every other in-flight task.
    #[must_use]
    pub async fn classify_async(path: &std::path::Path) -> Self {
        let owned = path.to_path_buf();
        compio::runtime::spawn_blocking(move || PathType::classify(&owned))
            .await
            .unwrap_or(PathType::Unknown)
    }
}

/// Immutable configuration for one [`crate::engine::CopyEngine`].
///
/// All fields carry the defaults from the external interface table;
/// invalid values are rejected by [`Options::validate`] at construction,
/// never later.
#[derive(Debug, Clone)]
pub struct Options {
    /// Cap on files being copied simultaneously.
    pub max_concurrent_files: usize,
    /// Cap on read/write streams per file.
    pub max_threads_per_file: usize,
    /// Cap on read/write streams across all files.
    pub max_total_threads: usize,
    /// Bytes per chunk and per read/write buffer.
    pub buffer_size: usize,
    /// Backpressure bound on pending jobs.
    pub max_file_queue_length: usize,
    /// Stage to a `.incomplete` path then rename, rather than writing the
    /// destination path directly.
    pub use_incomplete_filename: bool,
    /// Materialize empty source directories at the destination eagerly.
    pub copy_empty_directories: bool,
    /// Absolute prefix whose workers `t >= 1` see `_<t+1>` inserted; see
    /// the incremental-source-path mechanism.
    pub incremental_source_path: Option<PathBuf>,
    /// Threshold deciding single- vs. multi-worker election for a file.
    pub min_chunks_per_thread: usize,
    /// Skip copy when destination matches source by length and
    /// last-write-time (UTC).
    pub skip_existing_identical: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_concurrent_files: 4,
            max_threads_per_file: 4,
            max_total_threads: 4,
            buffer_size: 131_072,
            max_file_queue_length: 50,
            use_incomplete_filename: true,
            copy_empty_directories: false,
            incremental_source_path: None,
            min_chunks_per_thread: 32,
            skip_existing_identical: false,
        }
    }
}

impl Options {
    /// Validate field invariants, clamping `max_threads_per_file` to
    /// `max_total_threads` as the external interface requires, and
    /// rejecting any zero-valued cap.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::InvalidArgument`] if any `*_concurrent*`/
    /// `*_threads*`/`buffer_size`/`max_file_queue_length`/
    /// `min_chunks_per_thread` field is zero, or if
    /// `incremental_source_path` is set but not absolute.
    pub fn validate(mut self) -> Result<Self> {
        if self.max_concurrent_files == 0 {
            return Err(CopyError::InvalidArgument(
                "max_concurrent_files must be >= 1".into(),
            ));
        }
        if self.max_threads_per_file == 0 {
            return Err(CopyError::InvalidArgument(
                "max_threads_per_file must be >= 1".into(),
            ));
        }
        if self.max_total_threads == 0 {
            return Err(CopyError::InvalidArgument(
                "max_total_threads must be >= 1".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(CopyError::InvalidArgument(
                "buffer_size must be > 0".into(),
            ));
        }
        if self.max_file_queue_length == 0 {
            return Err(CopyError::InvalidArgument(
                "max_file_queue_length must be >= 1".into(),
            ));
        }
        if self.min_chunks_per_thread == 0 {
            return Err(CopyError::InvalidArgument(
                "min_chunks_per_thread must be >= 1".into(),
            ));
        }
        if let Some(prefix) = &self.incremental_source_path {
            if !prefix.is_absolute() {
                return Err(CopyError::InvalidArgument(format!(
                    "incremental_source_path must be absolute, got {}",
                    prefix.display()
                )));
            }
        }

        self.max_threads_per_file = self.max_threads_per_file.min(self.max_total_threads);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn zero_buffer_size_rejected() {
        let opts = Options {
            buffer_size: 0,
            ..Options::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(CopyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn threads_per_file_clamped_to_total() {
        let opts = Options {
            max_threads_per_file: 16,
            max_total_threads: 4,
            ..Options::default()
        };
        let validated = opts.validate().unwrap();
        assert_eq!(validated.max_threads_per_file, 4);
    }

    #[test]
    fn relative_incremental_source_path_rejected() {
        let opts = Options {
            incremental_source_path: Some(PathBuf::from("relative/path")),
            ..Options::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(CopyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn classify_directory_by_trailing_separator() {
        let path = std::path::PathBuf::from("/does/not/exist/");
        assert_eq!(PathType::classify(&path), PathType::Directory);
    }

    #[test]
    fn classify_unknown_for_nonexistent_bare_path() {
        let path = std::path::PathBuf::from("/does/not/exist/no-such-file");
        assert_eq!(PathType::classify(&path), PathType::Unknown);
    }

    #[compio::test]
    async fn classify_async_agrees_with_sync_classify() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            PathType::classify_async(dir.path()).await,
            PathType::Directory
        );
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(PathType::classify_async(&file).await, PathType::File);
    }
}
