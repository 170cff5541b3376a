//! Process entry point: parses the CLI, builds an [`Options`], wires up
//! logging and cancellation, and maps the terminal result to the exit
//! codes in the external-interface contract (0 success, 1 any failure or
//! cancellation).

use clap::Parser;
use paracopy::{CancellationToken, CopyEngine, EventEmitter, Sink, VerboseEvent, VerboseLevel};
use paracopy::cli::{validate_paths, Args};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Set by [`handle_sigint`], polled by the watcher thread spawned in
/// `main`. A raw signal handler may only touch async-signal-safe state,
/// so it does nothing beyond this store.
static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_signum: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

/// Installs a `SIGINT` handler and returns a thread that polls it,
/// forwarding a single cancellation into `cancel` and then exiting.
fn spawn_sigint_watcher(cancel: CancellationToken) {
    // SAFETY: `handle_sigint` only performs an atomic store, which is
    // async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as usize);
    }
    std::thread::spawn(move || loop {
        if SIGINT_RECEIVED.load(Ordering::SeqCst) {
            tracing::warn!("cancellation requested, winding down in-flight copies");
            cancel.cancel();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    });
}

/// Prints [`VerboseEvent`]s to stderr, filtering by the CLI's verbosity
/// level. This is the engine's host-facing progress channel, separate
/// from the `tracing` diagnostics configured in [`init_logging`].
struct StderrSink {
    shown_level: VerboseLevel,
}

impl Sink for StderrSink {
    fn on_event(&self, event: VerboseEvent) {
        if event.level <= self.shown_level {
            eprintln!("{event}");
        }
    }
}

fn init_logging(level: VerboseLevel) {
    let directive = match level {
        VerboseLevel::Quiet => "warn",
        VerboseLevel::Normal => "info",
        VerboseLevel::Verbose => "debug",
        VerboseLevel::Debug => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[compio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose_level());

    if let Err(err) = validate_paths(&args) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    let options = match args.to_options() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let sink = Arc::new(StderrSink {
        shown_level: args.verbose_level(),
    });
    let engine = match CopyEngine::new(options, EventEmitter::new(sink)) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    spawn_sigint_watcher(cancel.clone());

    let result = engine
        .copy(
            &args.paths.source,
            &args.paths.destination,
            &args.mask(),
            cancel,
        )
        .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: &paracopy::CopyError) {
    if let paracopy::CopyError::Aggregate(errors) = err {
        eprintln!("error: {} failures during copy:", errors.len());
        for inner in errors {
            eprintln!("  - {inner}");
        }
    } else {
        eprintln!("error: {err}");
    }
}
