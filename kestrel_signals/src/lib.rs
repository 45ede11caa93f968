//! Asynchronous-action coordination for the Kestrel runtime.
//!
//! OS signals, collector interrupts, profiling callbacks, finalizers, and
//! preemption requests all funnel through one mechanism: an arrival is
//! *recorded* with a handful of atomic stores (safe inside a real OS
//! signal handler), every running domain's allocation watermark is armed,
//! and the work itself runs later at a safe point, on a thread holding
//! the master lock, via [`Dispatcher::process_pending_actions`].
//!
//! The crate splits along that producer/consumer line:
//!
//! - [`PendingSignalSet`] and [`Signals`]: the async-signal-safe recorder
//!   and the shared tables around it.
//! - [`Domain`]: per-worker interrupt state, polled on allocation.
//! - [`Dispatcher`]: the safe-point drain, blocking sections, mask
//!   updates, and synchronous waits.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod blocking;
pub mod dispatch;
pub mod domain;
pub mod handlers;
pub mod mask;
mod os;
pub mod pending;
pub mod signals;

pub use blocking::{BlockingHooks, MasterLockHooks};
pub use dispatch::{Dispatcher, NoopHooks, RuntimeHooks};
pub use domain::{Domain, DomainState, MAX_DOMAINS};
pub use handlers::{SignalAction, SignalHandler};
pub use mask::{MaskHow, SignalSet};
pub use pending::{PendingSignalSet, NSIG};
pub use signals::{spawn_preemption_ticker, Signals};

/// The signal number the tick thread records to request preemption.
///
/// Chosen because programs essentially never use virtual-timer alarms;
/// a recorded arrival is rewritten into a master-lock yield request
/// instead of running a handler.
#[cfg(unix)]
pub const PREEMPTION_SIGNAL: i32 = libc::SIGVTALRM;

/// The signal number the tick thread records to request preemption.
#[cfg(not(unix))]
pub const PREEMPTION_SIGNAL: i32 = 26;
