//! Error taxonomy for the coordination core.
//!
//! Three layers, matching how failures travel through the runtime:
//!
//! - [`CallbackError`] is what program-level callbacks (signal handlers,
//!   profiling callbacks, finalizers) return. `Interrupted` is the benign
//!   "user requested stop" sentinel and is never treated as fatal.
//! - [`DrainError`] is a real failure surfacing from a pending-action
//!   drain, tagged with the category of action that raised it.
//! - [`CoordError`] covers protocol misuse and OS-level failures of the
//!   coordination entry points themselves.

use std::fmt;

use thiserror::Error;

// =============================================================================
// Action Categories
// =============================================================================

/// The category of delayable asynchronous action that ran a callback.
///
/// Used to label a [`DrainError`] so a diagnostic can say which kind of
/// action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// A signal handler registered by the program.
    SignalHandler,
    /// A profiling (allocation-sampling) callback.
    Profiling,
    /// A finalizer attached to a heap object.
    Finalizer,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::SignalHandler => "signal handler",
            ActionKind::Profiling => "profiling callback",
            ActionKind::Finalizer => "finalizer",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Callback Results
// =============================================================================

/// Failure raised by a program-level callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The benign interruption sentinel ("stop cooperatively").
    ///
    /// The dispatcher discards this after distinguishing it from real
    /// failures; it never aborts a drain and never reaches the caller.
    #[error("interrupted")]
    Interrupted,

    /// A propagating failure. Aborts the current drain pass and travels
    /// to whichever call site triggered the drain.
    #[error("{0}")]
    Failure(String),
}

/// Result of invoking a program-level callback.
pub type AsyncResult = Result<(), CallbackError>;

// =============================================================================
// Drain Failures
// =============================================================================

/// A non-benign failure that aborted a pending-action drain.
///
/// The dispatcher re-arms the action-pending flag before returning this,
/// so the remaining actions are re-examined at the next poll point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} raised an asynchronous failure: {message}")]
pub struct DrainError {
    /// Which action category raised the failure.
    pub kind: ActionKind,
    /// Human-readable payload from the callback.
    pub message: String,
}

impl DrainError {
    /// Build a drain error from a callback failure payload.
    pub fn new(kind: ActionKind, message: impl Into<String>) -> Self {
        DrainError {
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Coordination Errors
// =============================================================================

/// Errors returned by the coordination entry points.
///
/// Protocol misuse never corrupts shared state; the error is returned to
/// the immediate caller.
#[derive(Debug, Error)]
pub enum CoordError {
    /// Signal number outside `1..NSIG`.
    #[error("invalid signal number {0}")]
    InvalidSignal(i32),

    /// `leave_blocking_section` without a matching enter.
    #[error("leave_blocking_section called outside a blocking section")]
    NotInBlockingSection,

    /// Every execution-context slot is in use.
    #[error("too many registered domains (max {0})")]
    TooManyDomains(usize),

    /// OS-level installation attempted through a private signal table.
    ///
    /// The installed OS handler records into the process-wide table, so
    /// installing through any other instance would strand deliveries.
    #[error("OS signal dispositions can only be installed through the global signal table")]
    NotGlobalTable,

    /// An OS primitive failed.
    #[error("{context}: {source}")]
    Os {
        /// The primitive that failed (e.g. `"sigaction"`).
        context: &'static str,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A drain triggered by this entry point failed.
    #[error(transparent)]
    Async(#[from] DrainError),
}

impl CoordError {
    /// Wrap an OS error with the name of the primitive that failed.
    pub fn os(context: &'static str, source: std::io::Error) -> Self {
        CoordError::Os { context, source }
    }
}

// =============================================================================
// Fatal Errors
// =============================================================================

/// Abort the process with a diagnostic.
///
/// Reserved for resource exhaustion during runtime bring-up (thread or
/// lock creation failure), where no caller can meaningfully recover.
pub fn fatal_error(msg: &str) -> ! {
    eprintln!("kestrel: fatal error: {msg}");
    std::process::abort()
}

// =============================================================================
// Tests
// =============================================================================
