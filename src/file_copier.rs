//! Orchestrates a single file copy: admission, staging, spawning
//! `ChunkWorker`s, metadata preservation, finalization.
//!
//! This is the largest component by design: it is the only place all four
//! budget gates, the chunk cursor, the resize gate, and the
//! incremental-source-path rewrite meet. Metadata preservation operates on
//! plain paths rather than directory-relative file descriptors; TOCTOU-safe
//! `*at`-syscall traversal is out of scope.

use crate::budget::BudgetGuards;
use crate::cancel::CancellationToken;
use crate::chunk_worker::{self, ChunkWorkerArgs};
use crate::cursor::{ChunkCursor, ResizeGate};
use crate::error::{CopyError, Result};
use crate::events::{EventEmitter, VerboseLevel};
use crate::options::Options;
use crate::stats::FileProgress;
use compio::dispatcher::Dispatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// A single file to copy, produced by the walker and consumed here.
#[derive(Debug, Clone)]
pub struct CopyJob {
    /// Absolute source file path.
    pub source: PathBuf,
    /// Absolute destination file path.
    pub destination: PathBuf,
}

/// Copy one [`CopyJob`] end to end, following the protocol in full:
/// acquire gates, stat, elect worker count, stage, spawn and join workers,
/// finalize, preserve metadata, update statistics, release gates.
///
/// # Errors
///
/// Returns [`CopyError::IoRead`]/[`CopyError::IoWrite`]/
/// [`CopyError::IoRename`]/[`CopyError::IoDelete`]/[`CopyError::IoMetadata`]
/// on the corresponding failure, or [`CopyError::Cancelled`] if
/// cancellation was observed before finalization.
#[allow(clippy::too_many_arguments)]
pub async fn copy_one(
    job: CopyJob,
    options: Arc<Options>,
    guards: BudgetGuards,
    dispatcher: &'static Dispatcher,
    progress: Arc<FileProgress>,
    events: EventEmitter,
    cancel: CancellationToken,
) -> Result<()> {
    // Step 1: G_file, then G_thread_safety.
    let _file_permit = guards.file.acquire().await;
    let thread_safety_permit = guards.thread_safety.acquire().await;

    // Step 2: stat source; honor skip_existing_identical.
    let src_meta = tokio_like_metadata(&job.source).await?;
    if options.skip_existing_identical {
        if let Ok(dst_meta) = tokio_like_metadata(&job.destination).await {
            if dst_meta.len() == src_meta.len()
                && mtime_seconds(&dst_meta) == mtime_seconds(&src_meta)
            {
                events.emit(
                    VerboseLevel::Verbose,
                    format!("skip (identical): {}", job.destination.display()),
                );
                drop(thread_safety_permit);
                return Ok(());
            }
        }
    }

    // Step 3: elect worker count k.
    let source_length = src_meta.len();
    let min_bytes_per_worker =
        (options.buffer_size as u64) * (options.min_chunks_per_thread as u64);
    let k_max = (source_length / min_bytes_per_worker.max(1)).max(1);
    #[allow(clippy::cast_possible_truncation)]
    let k = (options.max_threads_per_file as u64).min(k_max) as usize;

    // Step 4: acquire G_thread k times, then release G_thread_safety.
    let mut thread_permits = Vec::with_capacity(k);
    for _ in 0..k {
        thread_permits.push(guards.thread.acquire().await);
    }
    drop(thread_safety_permit);

    // Step 5: ensure destination directory exists; delete existing dest.
    // Checked here, not just after the workers join, so a job admitted
    // just before cancellation fires does not delete a pre-existing
    // destination with nothing to replace it.
    if cancel.is_cancelled() {
        drop(thread_permits);
        return Err(CopyError::Cancelled);
    }
    if let Some(parent) = job.destination.parent() {
        create_dir_all(parent).await?;
    }
    remove_file_if_exists(&job.destination).await?;

    // Step 6: compute staging path, create/truncate to length 0.
    let staging_path = staging_path_for(&job.destination, options.use_incomplete_filename);
    create_empty_file(&staging_path).await?;

    // Step 7: shared cursor + resize gate; spawn k ChunkWorkers.
    let cursor = Arc::new(ChunkCursor::new());
    let resize_gate = Arc::new(ResizeGate::new());
    let mut receivers = Vec::with_capacity(k);
    for worker_index in 0..k {
        let source_path = rewrite_source_for_worker(
            &job.source,
            worker_index,
            options.incremental_source_path.as_deref(),
        );
        let args = ChunkWorkerArgs {
            source_path,
            staging_path: staging_path.clone(),
            cursor: Arc::clone(&cursor),
            resize_gate: Arc::clone(&resize_gate),
            buffer_size: options.buffer_size,
            progress: Arc::clone(&progress),
            cancel: cancel.clone(),
        };
        let receiver = dispatcher
            .dispatch(move || chunk_worker::run(args))
            .map_err(|source| CopyError::IoWrite {
                path: staging_path.clone(),
                source: std::io::Error::other(format!("{source:?}")),
            })?;
        receivers.push(receiver);
    }

    // Step 8: await all workers.
    let mut worker_results = Vec::with_capacity(receivers.len());
    for receiver in receivers {
        worker_results.push(receiver.await.map_err(|_| CopyError::IoWrite {
            path: staging_path.clone(),
            source: std::io::Error::other("chunk worker task panicked"),
        })?);
    }
    for result in worker_results {
        result?;
    }

    if cancel.is_cancelled() {
        let _ = remove_file_if_exists(&staging_path).await;
        return Err(CopyError::Cancelled);
    }

    // Step 9: finalize.
    if staging_path != job.destination {
        remove_file_if_exists(&job.destination).await?;
        rename(&staging_path, &job.destination).await?;
    }

    // Step 10: preserve metadata.
    preserve_metadata(&job.source, &job.destination).await?;

    // Step 11: update statistics, emit event.
    progress.increment_files();
    events.emit(
        VerboseLevel::Normal,
        format!(
            "{} -> {} ({} bytes, {} workers)",
            job.source.display(),
            job.destination.display(),
            source_length,
            k
        ),
    );

    // Step 12: gates release via drop (file_permit, thread_permits).
    drop(thread_permits);
    Ok(())
}

/// For worker index `t`, if `t > 0` and `incremental_source_path` is set
/// and the job's source path, case-insensitively, starts with that
/// prefix, rewrite to `prefix + "_" + (t+1) + suffix`. Worker 0 always
/// uses the unmodified path.
fn rewrite_source_for_worker(
    source: &Path,
    worker_index: usize,
    incremental_prefix: Option<&Path>,
) -> PathBuf {
    if worker_index == 0 {
        return source.to_path_buf();
    }
    let Some(prefix) = incremental_prefix else {
        return source.to_path_buf();
    };

    let source_str = source.to_string_lossy();
    let prefix_str = prefix.to_string_lossy();
    if source_str.len() < prefix_str.len()
        || !source_str[..prefix_str.len()].eq_ignore_ascii_case(&prefix_str)
    {
        return source.to_path_buf();
    }

    let suffix = &source_str[prefix_str.len()..];
    PathBuf::from(format!("{prefix_str}_{}{suffix}", worker_index + 1))
}

/// Staging filename pattern: `<destination-with-trailing-dots-stripped>.
/// <unique-token>.incomplete`, or the destination path unchanged if
/// `use_incomplete_filename` is false.
fn staging_path_for(destination: &Path, use_incomplete_filename: bool) -> PathBuf {
    if !use_incomplete_filename {
        return destination.to_path_buf();
    }
    let stripped = destination.to_string_lossy();
    let stripped = stripped.trim_end_matches('.');
    let token = unique_token();
    PathBuf::from(format!("{stripped}.{token}.incomplete"))
}

fn unique_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{nanos:x}", std::process::id())
}

async fn tokio_like_metadata(path: &Path) -> Result<std::fs::Metadata> {
    compio::fs::metadata(path)
        .await
        .map_err(|source| CopyError::IoMetadata {
            path: path.to_path_buf(),
            source,
        })
}

fn mtime_seconds(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime()
}

async fn create_dir_all(path: &Path) -> Result<()> {
    compio::fs::create_dir_all(path)
        .await
        .or_else(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                Ok(())
            } else {
                Err(source)
            }
        })
        .map_err(|source| CopyError::IoWrite {
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match compio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CopyError::IoDelete {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn create_empty_file(path: &Path) -> Result<()> {
    compio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map(|_file| ())
        .map_err(|source| CopyError::IoWrite {
            path: path.to_path_buf(),
            source,
        })
}

async fn rename(from: &Path, to: &Path) -> Result<()> {
    compio::fs::rename(from, to)
        .await
        .map_err(|source| CopyError::IoRename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })
}

/// Mirror source timestamps, permission bits, and (on POSIX) owner
/// uid/gid onto the destination. Best-effort per the external-interface
/// contract, but each failing step raises its own taxonomic error rather
/// than being silently swallowed, since spec.md requires metadata failures
/// to be reported.
async fn preserve_metadata(source: &Path, destination: &Path) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let src_meta = tokio_like_metadata(source).await?;

    // Chown before chmod: changing ownership after permission bits are set
    // can silently clear pre-existing setuid/setgid bits on POSIX, so the
    // owner/times must be applied first and the mode bits applied last.
    let uid = src_meta.uid();
    let gid = src_meta.gid();
    let atime = (src_meta.atime(), src_meta.atime_nsec());
    let mtime = (src_meta.mtime(), src_meta.mtime_nsec());
    let dest_for_blocking = destination.to_path_buf();

    compio::runtime::spawn_blocking(move || apply_owner_and_times(&dest_for_blocking, uid, gid, atime, mtime))
        .await
        .map_err(|source_err| CopyError::IoMetadata {
            path: destination.to_path_buf(),
            source: std::io::Error::other(source_err.to_string()),
        })?
        .map_err(|source_err| CopyError::IoMetadata {
            path: destination.to_path_buf(),
            source: source_err,
        })?;

    compio::fs::set_permissions(
        destination,
        std::fs::Permissions::from_mode(src_meta.mode()),
    )
    .await
    .map_err(|source_err| CopyError::IoMetadata {
        path: destination.to_path_buf(),
        source: source_err,
    })
}

fn apply_owner_and_times(
    path: &Path,
    uid: u32,
    gid: u32,
    atime: (i64, i64),
    mtime: (i64, i64),
) -> std::io::Result<()> {
    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Best-effort ownership: non-root callers cannot chown to an
    // arbitrary uid/gid; ignore EPERM rather than failing the whole copy.
    let chown_result =
        unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if chown_result != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(err);
        }
    }

    let times = [
        libc::timespec {
            tv_sec: atime.0,
            tv_nsec: atime.1,
        },
        libc::timespec {
            tv_sec: mtime.0,
            tv_nsec: mtime.1,
        },
    ];
    let result = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
    if result != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_zero_keeps_original_source() {
        let src = PathBuf::from("/mnt/share/file.bin");
        let rewritten = rewrite_source_for_worker(&src, 0, Some(Path::new("/mnt/share")));
        assert_eq!(rewritten, src);
    }

    #[test]
    fn worker_one_gets_incremental_suffix() {
        let src = PathBuf::from("/mnt/share/file.bin");
        let rewritten = rewrite_source_for_worker(&src, 1, Some(Path::new("/mnt/share")));
        assert_eq!(rewritten, PathBuf::from("/mnt/share_2/file.bin"));
    }

    #[test]
    fn non_matching_prefix_is_left_alone() {
        let src = PathBuf::from("/other/place/file.bin");
        let rewritten = rewrite_source_for_worker(&src, 1, Some(Path::new("/mnt/share")));
        assert_eq!(rewritten, src);
    }

    #[test]
    fn no_prefix_configured_is_left_alone() {
        let src = PathBuf::from("/mnt/share/file.bin");
        let rewritten = rewrite_source_for_worker(&src, 1, None);
        assert_eq!(rewritten, src);
    }

    #[test]
    fn staging_path_strips_trailing_dots_and_adds_incomplete_suffix() {
        let dst = PathBuf::from("/dst/archive...");
        let staging = staging_path_for(&dst, true);
        let staging_str = staging.to_string_lossy();
        assert!(staging_str.starts_with("/dst/archive."));
        assert!(staging_str.ends_with(".incomplete"));
        assert!(!staging_str["/dst/archive.".len()..]
            .trim_end_matches(".incomplete")
            .is_empty());
    }

    #[test]
    fn staging_path_is_destination_when_incomplete_disabled() {
        let dst = PathBuf::from("/dst/archive.bin");
        assert_eq!(staging_path_for(&dst, false), dst);
    }
}
