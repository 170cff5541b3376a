//! Observer contract for host-visible progress events.
//!
//! The engine's only coupling to a CLI or any other host is this callback:
//! a trait object that receives level-tagged messages. This replaces the
//! delegate-style multicast callback of a garbage-collected original with a
//! single trait, owned by the engine for the duration of one operation.

use std::fmt;

/// Verbosity level attached to a [`VerboseEvent`].
///
/// Ordered so that `level <= shown_level` is a plain integer comparison,
/// matching the filtering contract hosts are expected to implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum VerboseLevel {
    /// Always shown, even with `-q`.
    Quiet = 0,
    /// Default level.
    Normal = 1,
    /// Shown with `-v`.
    Verbose = 2,
    /// Shown with `-vv` or higher.
    Debug = 3,
}

/// A single progress event, tagged with the level it was emitted at.
#[derive(Debug, Clone)]
pub struct VerboseEvent {
    /// The verbosity level this event was emitted at.
    pub level: VerboseLevel,
    /// The event message.
    pub message: String,
}

impl fmt::Display for VerboseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Observer trait implemented by hosts that want progress events.
///
/// Implementations should be cheap: the engine calls `on_event` from inside
/// hot paths (chunk loops, per-file finalization). Messages above the
/// host's threshold should be constructed lazily by the caller via
/// [`EventEmitter::emit_with`]'s thunk argument, not unconditionally
/// formatted.
pub trait Sink: Send + Sync {
    /// Receive one progress event.
    fn on_event(&self, event: VerboseEvent);
}

/// A [`Sink`] that drops every event. Used when no observer is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn on_event(&self, _event: VerboseEvent) {}
}

/// Helper held by engine components to emit events without allocating the
/// message when nobody is listening above the given level. The sink itself
/// (not this wrapper) decides whether to display or drop an event; the
/// thunk is only to avoid formatting cost when a caller wants to guard a
/// particularly chatty event.
#[derive(Clone)]
pub struct EventEmitter {
    sink: std::sync::Arc<dyn Sink>,
}

impl EventEmitter {
    /// Wrap a sink for use by engine components.
    #[must_use]
    pub fn new(sink: std::sync::Arc<dyn Sink>) -> Self {
        Self { sink }
    }

    /// An emitter that discards every event.
    #[must_use]
    pub fn null() -> Self {
        Self::new(std::sync::Arc::new(NullSink))
    }

    /// Emit an event built lazily from `thunk`, avoiding the allocation
    /// when the caller decides not to build a message at all.
    pub fn emit_with<F>(&self, level: VerboseLevel, thunk: F)
    where
        F: FnOnce() -> String,
    {
        self.sink.on_event(VerboseEvent {
            level,
            message: thunk(),
        });
    }

    /// Emit a pre-built message.
    pub fn emit(&self, level: VerboseLevel, message: impl Into<String>) {
        self.sink.on_event(VerboseEvent {
            level,
            message: message.into(),
        });
    }
}
