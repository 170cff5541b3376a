//! Top-level orchestrator: serializes copy operations (one walk at a time
//! per engine instance), owns `BudgetGuards`, aggregates errors, emits
//! statistics.
//!
//! Follows a reset-stats/dispatch/join/finalize sequence, using a
//! `Box::leak`'d `'static` `Dispatcher` for the lifetime the fan-out tasks
//! need.

use crate::budget::{BudgetGuards, OwnedPermit};
use crate::cancel::CancellationToken;
use crate::error::{CopyError, ErrorBag, Result};
use crate::events::{EventEmitter, VerboseLevel};
use crate::file_copier::{self, CopyJob};
use crate::options::{Options, PathType};
use crate::stats::FileProgress;
use crate::walker::{self, JobSink, Mask};
use compio::dispatcher::Dispatcher;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// A dispatched file-copy task's result, type-erased so callers don't need
/// to name whatever concrete future type `Dispatcher::dispatch` returns.
type JobHandle = Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>;

/// The parallel copy engine. One instance serializes its own operations
/// (the "operation gate" of spec.md §4.1) but may be used concurrently by
/// multiple callers, who simply queue behind each other.
pub struct CopyEngine {
    options: Arc<Options>,
    guards: BudgetGuards,
    dispatcher: &'static Dispatcher,
    progress: Arc<FileProgress>,
    error_bag: Arc<ErrorBag>,
    events: EventEmitter,
    operation_gate: compio_sync::Semaphore,
}

impl CopyEngine {
    /// Construct an engine from validated options. Builds its own
    /// `'static` dispatcher, the four budget gates, and a fresh
    /// progress/error-bag pair.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::InvalidArgument`] if the dispatcher cannot be
    /// created.
    pub fn new(options: Options, events: EventEmitter) -> Result<Self> {
        let dispatcher = Dispatcher::new().map_err(|source| {
            CopyError::InvalidArgument(format!("failed to create task dispatcher: {source}"))
        })?;
        // 'static lifetime required so dispatched closures (which run on
        // worker threads and may outlive any single `copy()` call's stack
        // frame) can reference the dispatcher to fan out further work.
        let dispatcher: &'static Dispatcher = Box::leak(Box::new(dispatcher));

        let guards = BudgetGuards::new(&options);
        Ok(Self {
            options: Arc::new(options),
            guards,
            dispatcher,
            progress: Arc::new(FileProgress::new()),
            error_bag: Arc::new(ErrorBag::new()),
            events,
            operation_gate: compio_sync::Semaphore::new(1),
        })
    }

    /// Current progress counters. Valid to read at any time; most useful
    /// immediately after a `copy`/`copy_file` call returns.
    #[must_use]
    pub fn progress(&self) -> &FileProgress {
        &self.progress
    }

    /// Copy a single file without walking.
    ///
    /// # Errors
    ///
    /// See [`CopyEngine::copy`].
    pub async fn copy_file(
        &self,
        src: &Path,
        dst: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        let _operation_permit = self.operation_gate.acquire().await;
        self.progress.reset();
        self.error_bag.clear();

        let destination = if PathType::classify_async(dst).await == PathType::Directory {
            #[allow(clippy::unwrap_used)]
            dst.join(src.file_name().unwrap())
        } else {
            dst.to_path_buf()
        };
        let job = CopyJob {
            source: src.to_path_buf(),
            destination,
        };
        let permit = self.guards.queue.acquire_owned().await;
        let receiver = self.dispatch_job(job, permit, cancel.clone())?;
        let result = await_job(receiver).await;
        self.finish_operation(result.err(), &cancel)
    }

    /// Copy a file or directory tree. Returns after all dispatched file
    /// copies complete or cancellation is observed.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::InvalidArgument`]/[`CopyError::NotFound`] for
    /// the src/dst classification failures in spec.md §4.1, or the single
    /// contained error / [`CopyError::Aggregate`] accumulated from the
    /// walked files.
    pub async fn copy(
        &self,
        src: &Path,
        dst: &Path,
        mask: &Mask,
        cancel: CancellationToken,
    ) -> Result<()> {
        let _operation_permit = self.operation_gate.acquire().await;
        self.progress.reset();
        self.error_bag.clear();

        let sink = DispatchingSink {
            engine: self,
            cancel: cancel.clone(),
            receivers: std::sync::Mutex::new(Vec::new()),
        };
        let walk_result = walker::walk(
            src,
            dst,
            mask,
            &self.guards,
            self.options.copy_empty_directories,
            &cancel,
            &sink,
        )
        .await;

        #[allow(clippy::unwrap_used)]
        let receivers = std::mem::take(&mut *sink.receivers.lock().unwrap());
        let mut first_fatal = walk_result.err();
        for receiver in receivers {
            if let Err(err) = await_job(receiver).await {
                if err.is_cancellation() {
                    cancel.cancel();
                } else {
                    self.error_bag.push(err);
                }
            }
        }

        self.finish_operation(first_fatal.take(), &cancel)
    }

    fn dispatch_job(
        &self,
        job: CopyJob,
        queue_permit: OwnedPermit,
        cancel: CancellationToken,
    ) -> Result<JobHandle> {
        let options = Arc::clone(&self.options);
        let guards = self.guards.clone();
        let dispatcher = self.dispatcher;
        let progress = Arc::clone(&self.progress);
        let events = self.events.clone();

        let receiver = self
            .dispatcher
            .dispatch(move || async move {
                let result = file_copier::copy_one(
                    job, options, guards, dispatcher, progress, events, cancel,
                )
                .await;
                drop(queue_permit);
                result
            })
            .map_err(|source| {
                CopyError::InvalidArgument(format!("failed to dispatch file copy: {source:?}"))
            })?;

        // The dispatcher hands back a receiver whose own `.await` can fail
        // independently (the worker thread panicked) on top of whatever
        // `copy_one` returned; flatten both failure modes into one
        // `Result<()>` here so callers only deal with `CopyError`.
        let flattened = async move {
            receiver.await.map_err(|source| {
                CopyError::InvalidArgument(format!(
                    "file copy task failed to report its result: {source:?}"
                ))
            })?
        };
        Ok(Box::pin(flattened))
    }

    fn finish_operation(
        &self,
        fatal: Option<CopyError>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.events.emit(
            VerboseLevel::Normal,
            format!(
                "copied {} files, {} bytes in {:?}",
                self.progress.copied_file_count(),
                self.progress.copied_byte_count(),
                self.progress.elapsed()
            ),
        );

        if cancel.is_cancelled() {
            self.error_bag.clear();
            return Err(CopyError::Cancelled);
        }
        if let Some(err) = fatal {
            if !err.is_cancellation() {
                self.error_bag.push(err);
            }
        }
        ErrorBag::finish(self.error_bag.take())
    }
}

/// Adapts [`CopyEngine::dispatch_job`] to the [`JobSink`] contract the
/// walker drives.
struct DispatchingSink<'a> {
    engine: &'a CopyEngine,
    cancel: CancellationToken,
    receivers: std::sync::Mutex<Vec<JobHandle>>,
}

impl JobSink for DispatchingSink<'_> {
    fn accept(&self, job: CopyJob, queue_permit: OwnedPermit) -> Result<()> {
        let receiver = self
            .engine
            .dispatch_job(job, queue_permit, self.cancel.clone())?;
        #[allow(clippy::unwrap_used)]
        self.receivers.lock().unwrap().push(receiver);
        Ok(())
    }
}

async fn await_job(handle: JobHandle) -> Result<()> {
    handle.await
}
