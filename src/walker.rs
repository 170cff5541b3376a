//! Discovers files/directories under a source path and issues [`CopyJob`]s
//! with backpressure.
//!
//! Discovery does not build the full result in memory: each job acquires
//! `G_queue` before being handed to the caller, bounding the depth of
//! pending work to `max_file_queue_length` rather than returning an
//! unbounded `Vec`.

use crate::budget::{BudgetGuards, OwnedPermit};
use crate::cancel::CancellationToken;
use crate::error::{CopyError, Result};
use crate::file_copier::CopyJob;
use crate::options::PathType;
use std::path::{Path, PathBuf};

/// A glob-style filename mask, restricted to the single `*` wildcard per
/// spec.md's explicit non-goal of "no pattern include/exclude rules
/// beyond a single filename mask".
#[derive(Debug, Clone)]
pub struct Mask(String);

impl Mask {
    /// Match-everything mask, the default.
    #[must_use]
    pub fn any() -> Self {
        Self("*".to_string())
    }

    /// Build a mask from a pattern string such as `*.log`.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// True if `name` matches this mask.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let Some(star) = self.0.find('*') else {
            return self.0 == name;
        };
        let (prefix, suffix) = (&self.0[..star], &self.0[star + 1..]);
        name.len() >= prefix.len() + suffix.len()
            && name.starts_with(prefix)
            && name.ends_with(suffix)
    }
}

/// Callback invoked once per discovered file, after `G_queue` has been
/// acquired for that job. The sink takes ownership of `queue_permit` and
/// must hold it until the dispatched `FileCopier` for this job has
/// completed (success or failure) — that is what makes `G_queue` bound
/// the depth of pending work rather than just the depth of admission.
/// Returning an error stops the walk and is surfaced to the caller of
/// [`walk`].
pub trait JobSink {
    /// Handle one admitted [`CopyJob`], taking ownership of its queue
    /// permit.
    fn accept(&self, job: CopyJob, queue_permit: OwnedPermit) -> Result<()>;
}

/// Walk `src` into `dst` per the classification rules, dispatching each
/// discovered file as a [`CopyJob`] to `sink` after acquiring `G_queue`.
/// Stops admitting new jobs (and further directory descent) as soon as
/// `cancel` is observed cancelled.
///
/// # Errors
///
/// Returns [`CopyError::NotFound`] if a declared directory source does not
/// exist, [`CopyError::InvalidArgument`] if `src` is a directory but `dst`
/// is an existing regular file, or any error `sink.accept` returns.
#[allow(clippy::too_many_arguments)]
pub async fn walk(
    src: &Path,
    dst: &Path,
    mask: &Mask,
    guards: &BudgetGuards,
    copy_empty_directories: bool,
    cancel: &CancellationToken,
    sink: &dyn JobSink,
) -> Result<()> {
    let src_type = PathType::classify_async(src).await;
    let dst_type = PathType::classify_async(dst).await;

    match src_type {
        PathType::Directory => {
            if !path_is_dir(src).await {
                return Err(CopyError::NotFound {
                    path: src.to_path_buf(),
                });
            }
            if dst_type == PathType::File {
                return Err(CopyError::InvalidArgument(format!(
                    "source {} is a directory but destination {} is an existing file",
                    src.display(),
                    dst.display()
                )));
            }
            walk_directory(src, dst, mask, guards, copy_empty_directories, cancel, sink).await
        }
        PathType::File => {
            let destination = if dst_type == PathType::Directory {
                #[allow(clippy::unwrap_used)]
                dst.join(src.file_name().unwrap())
            } else {
                dst.to_path_buf()
            };
            admit(src.to_path_buf(), destination, guards, cancel, sink).await
        }
        PathType::Unknown => {
            // Last component is a filename mask; parent is the source
            // directory.
            let Some(parent) = src.parent() else {
                return Err(CopyError::NotFound {
                    path: src.to_path_buf(),
                });
            };
            if !path_is_dir(parent).await {
                return Err(CopyError::NotFound {
                    path: parent.to_path_buf(),
                });
            }
            let Some(pattern) = src.file_name().and_then(|n| n.to_str()) else {
                return Err(CopyError::InvalidArgument(format!(
                    "source mask {} is not valid UTF-8",
                    src.display()
                )));
            };
            let derived_mask = Mask::new(pattern);
            walk_directory(
                parent,
                dst,
                &derived_mask,
                guards,
                copy_empty_directories,
                cancel,
                sink,
            )
            .await
        }
    }
}

/// `path.is_dir()` off the executor thread; blocking `stat` otherwise
/// stalls every other in-flight task on a single-threaded executor.
async fn path_is_dir(path: &Path) -> bool {
    let owned = path.to_path_buf();
    compio::runtime::spawn_blocking(move || owned.is_dir())
        .await
        .unwrap_or(false)
}

#[allow(clippy::too_many_arguments)]
async fn walk_directory(
    src: &Path,
    dst: &Path,
    mask: &Mask,
    guards: &BudgetGuards,
    copy_empty_directories: bool,
    cancel: &CancellationToken,
    sink: &dyn JobSink,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Ok(());
    }

    if copy_empty_directories {
        compio::fs::create_dir_all(dst)
            .await
            .or_else(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Ok(())
                } else {
                    Err(e)
                }
            })
            .map_err(|source| CopyError::IoWrite {
                path: dst.to_path_buf(),
                source,
            })?;
    }

    let (dir_entries, file_entries) = read_directory_entries(src.to_path_buf()).await?;

    for file_path in file_entries {
        if cancel.is_cancelled() {
            return Ok(());
        }
        #[allow(clippy::unwrap_used)]
        let name = file_path.file_name().unwrap().to_string_lossy().into_owned();
        if !mask.matches(&name) {
            continue;
        }
        let destination = dst.join(&name);
        admit(file_path, destination, guards, cancel, sink).await?;
    }

    for dir_path in dir_entries {
        if cancel.is_cancelled() {
            return Ok(());
        }
        #[allow(clippy::unwrap_used)]
        let name = dir_path.file_name().unwrap().to_string_lossy().into_owned();
        let child_dst = dst.join(&name);
        Box::pin(walk_directory(
            &dir_path,
            &child_dst,
            mask,
            guards,
            copy_empty_directories,
            cancel,
            sink,
        ))
        .await?;
    }

    Ok(())
}

/// Lists one directory's entries off the executor thread, splitting them
/// into (subdirectories, regular files). Non-regular, non-directory
/// entries (devices, sockets, ...) are dropped; the walker applies no
/// symlink traversal of its own, per spec.md's non-goal.
async fn read_directory_entries(dir: PathBuf) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let dir_for_error = dir.clone();
    compio::runtime::spawn_blocking(move || -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut dir_entries = Vec::new();
        let mut file_entries = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|source| CopyError::IoRead {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| CopyError::IoRead {
                path: dir.clone(),
                source,
            })?;
            let file_type = entry.file_type().map_err(|source| CopyError::IoRead {
                path: entry.path(),
                source,
            })?;
            if file_type.is_dir() {
                dir_entries.push(entry.path());
            } else if file_type.is_file() {
                file_entries.push(entry.path());
            }
        }
        Ok((dir_entries, file_entries))
    })
    .await
    .map_err(|join_err| CopyError::IoRead {
        path: dir_for_error,
        source: std::io::Error::other(join_err.to_string()),
    })?
}

async fn admit(
    source: PathBuf,
    destination: PathBuf,
    guards: &BudgetGuards,
    cancel: &CancellationToken,
    sink: &dyn JobSink,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Ok(());
    }
    let permit = guards.queue.acquire_owned().await;
    if cancel.is_cancelled() {
        return Ok(());
    }
    let job = CopyJob {
        source,
        destination,
    };
    sink.accept(job, permit)
}
