//! Per-signal dispositions.
//!
//! The table maps each signal number to its current [`SignalAction`].
//! Handlers are stored behind `Arc` and the table is replace-not-mutate:
//! dispatch clones the `Arc` under a read lock and drops the lock before
//! calling, so installing a handler never blocks behind a running one.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use kestrel_core::AsyncResult;

use crate::pending::NSIG;

/// A user-supplied handler: receives the signal number, runs as a normal
/// callback (master lock held), may fail asynchronously.
pub type SignalHandler = Arc<dyn Fn(i32) -> AsyncResult + Send + Sync>;

/// Disposition of one signal.
#[derive(Clone)]
pub enum SignalAction {
    /// Leave the OS default behavior in place.
    Default,
    /// Discard the signal.
    Ignore,
    /// Run the given callback at the next safe point.
    Handle(SignalHandler),
}

impl SignalAction {
    /// Convenience constructor for [`SignalAction::Handle`].
    pub fn handle(f: impl Fn(i32) -> AsyncResult + Send + Sync + 'static) -> Self {
        SignalAction::Handle(Arc::new(f))
    }

    /// Whether this is a [`SignalAction::Handle`].
    pub fn is_handled(&self) -> bool {
        matches!(self, SignalAction::Handle(_))
    }
}

impl Default for SignalAction {
    fn default() -> Self {
        SignalAction::Default
    }
}

impl fmt::Debug for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Default => f.write_str("Default"),
            SignalAction::Ignore => f.write_str("Ignore"),
            SignalAction::Handle(_) => f.write_str("Handle(..)"),
        }
    }
}

/// The disposition table, indexed by signal number (slot 0 unused).
pub(crate) struct HandlerTable {
    slots: [RwLock<SignalAction>; NSIG],
}

impl HandlerTable {
    const VACANT: RwLock<SignalAction> = RwLock::new(SignalAction::Default);

    pub(crate) const fn new() -> Self {
        HandlerTable {
            slots: [Self::VACANT; NSIG],
        }
    }

    /// Current disposition of `signo` (a clone; cheap, `Arc` inside).
    pub(crate) fn get(&self, signo: i32) -> SignalAction {
        if signo <= 0 || signo >= NSIG as i32 {
            return SignalAction::Default;
        }
        self.slots[signo as usize].read().clone()
    }

    /// Swap in a new disposition, returning the previous one.
    ///
    /// Caller has validated `signo`.
    pub(crate) fn replace(&self, signo: i32, action: SignalAction) -> SignalAction {
        std::mem::replace(&mut *self.slots[signo as usize].write(), action)
    }
}

// =============================================================================
// Tests
// =============================================================================
