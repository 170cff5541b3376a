//! One cooperative task that pulls chunk indices from a shared cursor and
//! performs positioned read/write for one file.
//!
//! A single `Vec<u8>` is truncated after each read and resized back to
//! capacity after each write, so steady-state chunk copying allocates
//! nothing once the buffer is warm.

use crate::cancel::CancellationToken;
use crate::cursor::{ChunkCursor, ResizeGate};
use crate::error::{CopyError, Result};
use crate::stats::FileProgress;
use compio::fs::{File, OpenOptions};
use compio::io::{AsyncReadAt, AsyncWriteAt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything one [`ChunkWorker`] needs, handed to it by `FileCopier` at
/// spawn time.
pub struct ChunkWorkerArgs {
    /// Source path for this worker. Index-0 workers always see the
    /// unmodified job source path; workers `t >= 1` may see the
    /// incremental-source-path rewrite applied by `FileCopier`.
    pub source_path: PathBuf,
    /// Shared staging path every worker of this file writes into.
    pub staging_path: PathBuf,
    /// Chunk-index allocator shared by all workers of this file.
    pub cursor: Arc<ChunkCursor>,
    /// Staging-file length-extension serializer shared by all workers of
    /// this file.
    pub resize_gate: Arc<ResizeGate>,
    /// Bytes per chunk.
    pub buffer_size: usize,
    /// Engine-wide byte counter.
    pub progress: Arc<FileProgress>,
    /// Cooperative cancellation flag.
    pub cancel: CancellationToken,
}

/// Copy chunks until the cursor runs past the end of the source, honoring
/// cancellation between every step.
///
/// # Errors
///
/// Returns [`CopyError::IoRead`]/[`CopyError::IoWrite`] if the underlying
/// positioned I/O fails, or [`CopyError::Cancelled`] if cancellation was
/// observed before any chunk was processed.
pub async fn run(args: ChunkWorkerArgs) -> Result<()> {
    if args.cancel.is_cancelled() {
        return Err(CopyError::Cancelled);
    }

    let src_file = File::open(&args.source_path)
        .await
        .map_err(|source| CopyError::IoRead {
            path: args.source_path.clone(),
            source,
        })?;
    let mut dst_file = OpenOptions::new()
        .write(true)
        .open(&args.staging_path)
        .await
        .map_err(|source| CopyError::IoWrite {
            path: args.staging_path.clone(),
            source,
        })?;

    let mut buffer = vec![0u8; args.buffer_size];

    loop {
        if args.cancel.is_cancelled() {
            return Ok(());
        }

        let idx = args.cursor.next();
        #[allow(clippy::cast_possible_truncation)]
        let start = idx * args.buffer_size as u64;

        let src_len = source_length(&src_file, &args.source_path).await?;
        if start >= src_len {
            return Ok(());
        }
        let effective_len = (src_len - start).min(args.buffer_size as u64);
        if effective_len == 0 {
            return Ok(());
        }

        if args.cancel.is_cancelled() {
            return Ok(());
        }

        let target_len = start + effective_len;
        let staging_path = &args.staging_path;
        args.resize_gate
            .guarded(|| async {
                extend_if_shorter(&dst_file, staging_path, target_len).await
            })
            .await?;

        if args.cancel.is_cancelled() {
            return Ok(());
        }

        buffer.truncate(args.buffer_size);
        let read_result = src_file.read_at(buffer, start).await;
        let bytes_read = read_result.0.map_err(|source| CopyError::IoRead {
            path: args.source_path.clone(),
            source,
        })?;
        buffer = read_result.1;
        if bytes_read == 0 {
            return Ok(());
        }
        buffer.truncate(bytes_read);

        let write_buffer = std::mem::take(&mut buffer);
        let write_result = dst_file.write_at(write_buffer, start).await;
        let bytes_written = write_result.0.map_err(|source| CopyError::IoWrite {
            path: args.staging_path.clone(),
            source,
        })?;
        buffer = write_result.1;
        buffer.resize(args.buffer_size, 0);

        #[allow(clippy::cast_possible_truncation)]
        args.progress.add_bytes(bytes_written as u64);
    }
}

async fn source_length(file: &File, path: &Path) -> Result<u64> {
    let meta = file.metadata().await.map_err(|source| CopyError::IoRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(meta.len())
}

async fn extend_if_shorter(file: &File, path: &Path, target_len: u64) -> Result<()> {
    let current = file.metadata().await.map_err(|source| CopyError::IoWrite {
        path: path.to_path_buf(),
        source,
    })?;
    if current.len() < target_len {
        file.set_len(target_len)
            .await
            .map_err(|source| CopyError::IoWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn prepare(src_content: &[u8]) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let staging = dir.path().join("dst.bin.incomplete");
        std::fs::write(&src, src_content).unwrap();
        std::fs::write(&staging, []).unwrap();
        (dir, src, staging)
    }

    #[compio::test]
    async fn single_worker_copies_whole_small_file() {
        let content = b"hello chunked world".to_vec();
        let (_dir, src, staging) = prepare(&content).await;

        let args = ChunkWorkerArgs {
            source_path: src,
            staging_path: staging.clone(),
            cursor: Arc::new(ChunkCursor::new()),
            resize_gate: Arc::new(ResizeGate::new()),
            buffer_size: 8,
            progress: Arc::new(FileProgress::new()),
            cancel: CancellationToken::new(),
        };
        let progress = Arc::clone(&args.progress);

        run(args).await.unwrap();

        let written = std::fs::read(&staging).unwrap();
        assert_eq!(written, content);
        assert_eq!(progress.copied_byte_count(), content.len() as u64);
    }

    #[compio::test]
    async fn two_workers_share_one_cursor_without_gaps() {
        let content: Vec<u8> = (0..64u8).collect();
        let (_dir, src, staging) = prepare(&content).await;

        let cursor = Arc::new(ChunkCursor::new());
        let resize_gate = Arc::new(ResizeGate::new());
        let progress = Arc::new(FileProgress::new());

        let make_args = || ChunkWorkerArgs {
            source_path: src.clone(),
            staging_path: staging.clone(),
            cursor: Arc::clone(&cursor),
            resize_gate: Arc::clone(&resize_gate),
            buffer_size: 8,
            progress: Arc::clone(&progress),
            cancel: CancellationToken::new(),
        };

        let (r1, r2) = futures::join!(run(make_args()), run(make_args()));
        r1.unwrap();
        r2.unwrap();

        let written = std::fs::read(&staging).unwrap();
        assert_eq!(written, content);
        assert_eq!(progress.copied_byte_count(), content.len() as u64);
    }

    #[compio::test]
    async fn cancelled_worker_writes_nothing() {
        let content = b"should not be copied".to_vec();
        let (_dir, src, staging) = prepare(&content).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let args = ChunkWorkerArgs {
            source_path: src,
            staging_path: staging.clone(),
            cursor: Arc::new(ChunkCursor::new()),
            resize_gate: Arc::new(ResizeGate::new()),
            buffer_size: 8,
            progress: Arc::new(FileProgress::new()),
            cancel,
        };

        run(args).await.unwrap();
        assert_eq!(std::fs::read(&staging).unwrap().len(), 0);
    }
}
