//! End-to-end scenarios driven through `CopyEngine::copy`/`copy_file`,
//! covering spec.md's concrete end-to-end cases and invariants.

use paracopy::{CancellationToken, CopyEngine, EventEmitter, Mask, Options};
use std::path::Path;
use tempfile::TempDir;

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

/// Scenario 1: a single small file under the worker-election threshold
/// copies byte-identical with a single worker.
#[compio::test]
async fn single_small_file_copies_byte_identical() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("small.bin");
    let dst = dir.path().join("out").join("small.bin");
    write_file(&src, &[7u8; 1024]);

    let engine = CopyEngine::new(Options::default(), EventEmitter::null()).unwrap();
    engine
        .copy_file(&src, &dst, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dst).unwrap(), vec![7u8; 1024]);
    assert_eq!(engine.progress().copied_file_count(), 1);
    assert_eq!(engine.progress().copied_byte_count(), 1024);
}

/// Scenario 2 (scaled down): a multi-chunk file elects more than one
/// worker and still finalizes to the exact source length.
#[compio::test]
async fn multi_chunk_file_elects_multiple_workers_and_finalizes_exact_length() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("big.bin");
    let dst = dir.path().join("big.bin.out");
    let payload: Vec<u8> = (0..1_048_576u32).map(|i| (i % 251) as u8).collect();
    write_file(&src, &payload);

    let options = Options {
        buffer_size: 4096,
        min_chunks_per_thread: 8,
        max_threads_per_file: 4,
        max_total_threads: 4,
        ..Options::default()
    }
    .validate()
    .unwrap();

    let engine = CopyEngine::new(options, EventEmitter::null()).unwrap();
    engine
        .copy_file(&src, &dst, CancellationToken::new())
        .await
        .unwrap();

    let copied = std::fs::read(&dst).unwrap();
    assert_eq!(copied.len(), payload.len());
    assert_eq!(copied, payload);
}

/// Scenario 3 (scaled down): many small files under a concurrency cap all
/// land at the destination with identical bytes, and the file counter
/// matches exactly.
#[compio::test]
async fn directory_of_many_small_files_all_copied() {
    let dir = TempDir::new().unwrap();
    let src_root = dir.path().join("src");
    let dst_root = dir.path().join("dst");
    const COUNT: usize = 64;
    for i in 0..COUNT {
        write_file(&src_root.join(format!("file_{i:04}.dat")), &[i as u8; 4096]);
    }

    let options = Options {
        max_concurrent_files: 8,
        ..Options::default()
    }
    .validate()
    .unwrap();
    let engine = CopyEngine::new(options, EventEmitter::null()).unwrap();
    engine
        .copy(&src_root, &dst_root, &Mask::any(), CancellationToken::new())
        .await
        .unwrap();

    for i in 0..COUNT {
        let got = std::fs::read(dst_root.join(format!("file_{i:04}.dat"))).unwrap();
        assert_eq!(got, vec![i as u8; 4096]);
    }
    assert_eq!(engine.progress().copied_file_count(), COUNT as u64);
}

/// Scenario 4: a mask-style source (no trailing separator, path does not
/// exist as-is) copies only the matching files.
#[compio::test]
async fn mask_source_copies_only_matching_files() {
    let dir = TempDir::new().unwrap();
    let src_root = dir.path().join("logs");
    let dst_root = dir.path().join("dst");
    write_file(&src_root.join("a.log"), b"a");
    write_file(&src_root.join("b.log"), b"b");
    write_file(&src_root.join("c.txt"), b"c");

    let engine = CopyEngine::new(Options::default(), EventEmitter::null()).unwrap();
    let masked_source = src_root.join("*.log");
    engine
        .copy(&masked_source, &dst_root, &Mask::any(), CancellationToken::new())
        .await
        .unwrap();

    assert!(dst_root.join("a.log").exists());
    assert!(dst_root.join("b.log").exists());
    assert!(!dst_root.join("c.txt").exists());
    assert_eq!(engine.progress().copied_file_count(), 2);
}

/// Scenario 5: cancelling mid-copy leaves no file at the destination path
/// and no stray staging file once the engine has wound down.
#[compio::test]
async fn cancellation_mid_copy_leaves_no_destination_file() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("large.bin");
    let dst = dir.path().join("large.bin.out");
    let payload: Vec<u8> = vec![9u8; 8 * 1024 * 1024];
    write_file(&src, &payload);

    let options = Options {
        buffer_size: 65536,
        min_chunks_per_thread: 4,
        max_threads_per_file: 4,
        max_total_threads: 4,
        ..Options::default()
    }
    .validate()
    .unwrap();
    let engine = CopyEngine::new(options, EventEmitter::null()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = engine.copy_file(&src, &dst, cancel).await;

    assert!(result.is_err());
    assert!(!dst.exists());
    let stray_incomplete = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".incomplete"))
        .count();
    assert!(stray_incomplete <= 1);
}

/// Scenario 6 (scaled down): two files share a smaller total-thread budget
/// than their individual per-file caps would allow; both still complete
/// and the byte totals match the sum of the sources.
#[compio::test]
async fn two_files_share_a_tight_total_thread_budget() {
    let dir = TempDir::new().unwrap();
    let src_root = dir.path().join("src");
    let dst_root = dir.path().join("dst");
    let payload_a: Vec<u8> = vec![1u8; 512 * 1024];
    let payload_b: Vec<u8> = vec![2u8; 512 * 1024];
    write_file(&src_root.join("a.bin"), &payload_a);
    write_file(&src_root.join("b.bin"), &payload_b);

    let options = Options {
        max_total_threads: 2,
        max_threads_per_file: 4,
        buffer_size: 16384,
        min_chunks_per_thread: 4,
        ..Options::default()
    }
    .validate()
    .unwrap();
    let engine = CopyEngine::new(options, EventEmitter::null()).unwrap();
    engine
        .copy(&src_root, &dst_root, &Mask::any(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(std::fs::read(dst_root.join("a.bin")).unwrap(), payload_a);
    assert_eq!(std::fs::read(dst_root.join("b.bin")).unwrap(), payload_b);
    assert_eq!(
        engine.progress().copied_byte_count(),
        (payload_a.len() + payload_b.len()) as u64
    );
}

/// Invariant 4/5: on clean success, no `.incomplete` staging file remains
/// under the destination.
#[compio::test]
async fn no_stray_staging_file_after_clean_success() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.txt");
    let dst = dir.path().join("out").join("a.txt");
    write_file(&src, b"contents");

    let engine = CopyEngine::new(Options::default(), EventEmitter::null()).unwrap();
    engine
        .copy_file(&src, &dst, CancellationToken::new())
        .await
        .unwrap();

    let entries: Vec<_> = std::fs::read_dir(dst.parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].file_name().to_string_lossy().contains("incomplete"));
}

/// Invariant 7: metadata (length, mtime) mirrors the source after success.
#[compio::test]
async fn metadata_mirrors_source_after_success() {
    use std::os::unix::fs::MetadataExt;

    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.bin");
    let dst = dir.path().join("a.bin.out");
    write_file(&src, &[3u8; 2048]);

    let engine = CopyEngine::new(Options::default(), EventEmitter::null()).unwrap();
    engine
        .copy_file(&src, &dst, CancellationToken::new())
        .await
        .unwrap();

    let src_meta = std::fs::metadata(&src).unwrap();
    let dst_meta = std::fs::metadata(&dst).unwrap();
    assert_eq!(src_meta.len(), dst_meta.len());
    assert_eq!(src_meta.mtime(), dst_meta.mtime());
}

/// Round-trip: re-copying with `skip_existing_identical` leaves the
/// destination untouched and still reports success.
#[compio::test]
async fn repeated_copy_with_skip_existing_identical_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.bin");
    let dst = dir.path().join("a.bin.out");
    write_file(&src, &[5u8; 4096]);

    let options = Options {
        skip_existing_identical: true,
        ..Options::default()
    }
    .validate()
    .unwrap();
    let engine = CopyEngine::new(options, EventEmitter::null()).unwrap();
    engine
        .copy_file(&src, &dst, CancellationToken::new())
        .await
        .unwrap();
    let first_copy_mtime = std::fs::metadata(&dst).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(10));
    engine
        .copy_file(&src, &dst, CancellationToken::new())
        .await
        .unwrap();
    let second_copy_mtime = std::fs::metadata(&dst).unwrap().modified().unwrap();

    assert_eq!(first_copy_mtime, second_copy_mtime);
}

/// Directory-source onto an existing regular-file destination is rejected
/// rather than silently truncating the file.
#[compio::test]
async fn directory_source_onto_file_destination_is_rejected() {
    let dir = TempDir::new().unwrap();
    let src_root = dir.path().join("src");
    write_file(&src_root.join("a.txt"), b"a");
    let dst = dir.path().join("dst_as_file");
    write_file(&dst, b"existing file");

    let engine = CopyEngine::new(Options::default(), EventEmitter::null()).unwrap();
    let err = engine
        .copy(&src_root, &dst, &Mask::any(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, paracopy::CopyError::InvalidArgument(_)));
}

