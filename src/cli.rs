//! Command-line interface definitions.
//!
//! This module is outside the core engine per the purpose statement: its
//! only coupling to the engine is building an [`Options`] value and an
//! [`events::EventEmitter`]. Organized as one flattened `PathConfig` plus
//! one `ConcurrencyConfig` plus one `OutputConfig`, grouping arguments by
//! the component that consumes them.

use crate::error::{CopyError, Result};
use crate::events::VerboseLevel;
use crate::options::Options;
use crate::walker::Mask;
use clap::Parser;
use std::path::PathBuf;

/// A parallel file/tree copy utility.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Source and destination paths.
    #[command(flatten)]
    pub paths: PathConfig,

    /// Concurrency budget configuration.
    #[command(flatten)]
    pub concurrency: ConcurrencyConfig,

    /// Output and logging configuration.
    #[command(flatten)]
    pub output: OutputConfig,
}

/// Paths configuration.
///
/// Used by: `main()`, `CopyEngine::copy()`.
#[derive(clap::Args, Debug, Clone)]
pub struct PathConfig {
    /// Source directory, file, or filename mask.
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination directory or file.
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,
}

/// Concurrency budget configuration.
///
/// Used by: `BudgetGuards::new()`, `FileCopier`, `ChunkWorker`.
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Concurrency Options")]
pub struct ConcurrencyConfig {
    /// Cap on files being copied simultaneously.
    #[arg(short = 'j', long, default_value_t = 4)]
    pub max_concurrent_files: usize,

    /// Cap on read/write streams per file.
    #[arg(short = 't', long, default_value_t = 4)]
    pub max_threads_per_file: usize,

    /// Cap on read/write streams across all files; `max_threads_per_file`
    /// is clamped to this value.
    #[arg(short = 'T', long, default_value_t = 4)]
    pub max_total_threads: usize,

    /// Bytes per chunk and per read/write buffer.
    #[arg(long, default_value_t = 131_072)]
    pub buffer_size: usize,

    /// Backpressure bound on pending jobs awaiting a `FileCopier`.
    #[arg(long, default_value_t = 50)]
    pub max_queue_length: usize,

    /// Threshold deciding single- vs. multi-worker election for a file.
    #[arg(long, default_value_t = 32)]
    pub min_chunks_per_thread: usize,
}

/// Output and logging configuration.
///
/// Used by: `main()` (subscriber init), `events::EventEmitter` filtering.
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Output Options")]
pub struct OutputConfig {
    /// Increase verbosity (repeatable: `-v`, `-vv`).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but error output. Conflicts with `--verbose`.
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Stage each file to a temporary `.incomplete` path and rename it
    /// into place on completion, rather than writing the destination
    /// directly. Pass `--no-incomplete-filename` to write the destination
    /// path directly instead.
    #[arg(long = "no-incomplete-filename", action = clap::ArgAction::SetFalse, default_value_t = true)]
    pub incomplete_filename: bool,

    /// Materialize empty source directories at the destination eagerly
    /// rather than only when the first file inside them is written.
    #[arg(long)]
    pub copy_empty_directories: bool,

    /// Absolute prefix whose per-file workers beyond the first are
    /// rewritten to `<prefix>_<N>`, exposing independent handles for
    /// single-connection network mounts.
    #[arg(long)]
    pub incremental_source_path: Option<PathBuf>,

    /// Skip a file when the destination already matches it by length and
    /// last-write-time.
    #[arg(long)]
    pub skip_existing_identical: bool,

    /// Filename mask applied when `SOURCE` is a directory (default: all
    /// files) or when `SOURCE` does not exist and its last component is
    /// treated as a mask.
    #[arg(long, default_value = "*")]
    pub mask: String,
}

impl Args {
    /// Build a validated [`Options`] from the parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::InvalidArgument`] if [`Options::validate`]
    /// rejects a field.
    pub fn to_options(&self) -> Result<Options> {
        Options {
            max_concurrent_files: self.concurrency.max_concurrent_files,
            max_threads_per_file: self.concurrency.max_threads_per_file,
            max_total_threads: self.concurrency.max_total_threads,
            buffer_size: self.concurrency.buffer_size,
            max_file_queue_length: self.concurrency.max_queue_length,
            use_incomplete_filename: self.output.incomplete_filename,
            copy_empty_directories: self.output.copy_empty_directories,
            incremental_source_path: self.output.incremental_source_path.clone(),
            min_chunks_per_thread: self.concurrency.min_chunks_per_thread,
            skip_existing_identical: self.output.skip_existing_identical,
        }
        .validate()
    }

    /// The filename mask to apply during discovery.
    #[must_use]
    pub fn mask(&self) -> Mask {
        Mask::new(self.output.mask.clone())
    }

    /// The verbosity level implied by `-v`/`-q`.
    #[must_use]
    pub fn verbose_level(&self) -> VerboseLevel {
        if self.output.quiet {
            return VerboseLevel::Quiet;
        }
        match self.output.verbose {
            0 => VerboseLevel::Normal,
            1 => VerboseLevel::Verbose,
            _ => VerboseLevel::Debug,
        }
    }
}

/// Validate path-argument combinations that `clap` cannot express on its
/// own (existence and type checks belong to the walker, not here; this
/// only guards against options that are self-contradictory regardless of
/// the filesystem).
///
/// # Errors
///
/// Returns [`CopyError::InvalidArgument`] if `source` and `destination`
/// are identical.
pub fn validate_paths(args: &Args) -> Result<()> {
    if args.paths.source == args.paths.destination {
        return Err(CopyError::InvalidArgument(
            "source and destination must differ".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut full = vec!["paracopy"];
        full.extend_from_slice(args);
        Args::parse_from(full)
    }

    #[test]
    fn defaults_match_spec_table() {
        let args = parse(&["src", "dst"]);
        let options = args.to_options().unwrap();
        assert_eq!(options.max_concurrent_files, 4);
        assert_eq!(options.max_threads_per_file, 4);
        assert_eq!(options.max_total_threads, 4);
        assert_eq!(options.buffer_size, 131_072);
        assert_eq!(options.max_file_queue_length, 50);
        assert!(options.use_incomplete_filename);
        assert!(!options.copy_empty_directories);
        assert_eq!(options.min_chunks_per_thread, 32);
        assert!(!options.skip_existing_identical);
    }

    #[test]
    fn verbose_and_quiet_are_mutually_exclusive() {
        let result =
            Args::try_parse_from(["paracopy", "src", "dst", "--verbose", "--quiet"]);
        assert!(result.is_err());
    }

    #[test]
    fn same_source_and_destination_rejected() {
        let args = parse(&["same", "same"]);
        assert!(validate_paths(&args).is_err());
    }

    #[test]
    fn repeated_verbose_raises_level() {
        let args = parse(&["src", "dst", "-vv"]);
        assert_eq!(args.verbose_level(), VerboseLevel::Debug);
    }

    #[test]
    fn no_incomplete_filename_flag_disables_staging() {
        let args = parse(&["src", "dst", "--no-incomplete-filename"]);
        let options = args.to_options().unwrap();
        assert!(!options.use_incomplete_filename);
    }
}
