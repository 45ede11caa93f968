//! The shared signal table: pending set, disposition table, domain slots.
//!
//! One `Signals` value is the rendezvous between OS signal handlers (which
//! only ever call [`record`](Signals::record)) and the dispatcher (which
//! consumes the pending set at safe points). The process-wide instance
//! behind [`Signals::global`] is what the installed trampoline targets;
//! dispatchers that install OS dispositions must be built over it, while
//! tests build private instances and record into them directly.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use kestrel_core::CoordError;

use kestrel_threads::TickThread;

use crate::domain::DomainTable;
use crate::handlers::{HandlerTable, SignalAction};
use crate::os;
use crate::pending::{PendingSignalSet, NSIG};
use crate::PREEMPTION_SIGNAL;

/// Shared signal state.
///
/// Const-constructible, so private instances (embedders, tests) cost
/// nothing to create. The process-wide instance lives behind
/// [`Signals::global`]; only that one may install OS dispositions.
pub struct Signals {
    pending: PendingSignalSet,
    handlers: HandlerTable,
    /// Serializes disposition changes (table swap + OS `sigaction`).
    install_mutex: Mutex<()>,
    domains: DomainTable,
}

static GLOBAL: OnceLock<Arc<Signals>> = OnceLock::new();

impl Signals {
    /// An empty table with all dispositions at their OS defaults.
    pub const fn new() -> Self {
        Signals {
            pending: PendingSignalSet::new(),
            handlers: HandlerTable::new(),
            install_mutex: Mutex::new(()),
            domains: DomainTable::new(),
        }
    }

    /// The process-wide instance targeted by installed OS handlers.
    ///
    /// Created on first use. Dispatchers built over a clone of this
    /// `Arc` share the table the trampoline records into.
    pub fn global() -> &'static Arc<Signals> {
        GLOBAL.get_or_init(|| Arc::new(Signals::new()))
    }

    /// The global instance, if it has been created.
    ///
    /// Async-signal-safe: one atomic load, no init. The trampoline can
    /// only have been installed through [`install`](Self::install) on
    /// the global instance, so by the time the OS calls it this is
    /// always `Some`.
    pub(crate) fn try_global() -> Option<&'static Arc<Signals>> {
        GLOBAL.get()
    }

    fn is_global(&self) -> bool {
        GLOBAL
            .get()
            .map_or(false, |g| std::ptr::eq(self, Arc::as_ptr(g)))
    }

    /// Record the arrival of `signo` and interrupt every active domain.
    ///
    /// Async-signal-safe; this is the whole body of the OS handler.
    /// Out-of-range numbers are dropped.
    #[inline]
    pub fn record(&self, signo: i32) {
        if self.pending.record(signo) {
            self.domains.interrupt_all();
        }
    }

    /// Cheap check: any recorded signal at all, masked or not.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.any_pending()
    }

    /// Is there a recorded signal the calling thread could dispatch now?
    ///
    /// Two-stage: the cheap flag check first, the mask query only when
    /// something is recorded.
    pub fn check_pending(&self) -> bool {
        if !self.pending.any_pending() {
            return false;
        }
        self.pending.any_unmasked(&os::current_mask())
    }

    /// Current disposition of `signo`.
    pub fn handler(&self, signo: i32) -> SignalAction {
        self.handlers.get(signo)
    }

    /// Swap the table disposition of `signo` without touching the OS.
    ///
    /// Used for signals the runtime delivers itself (and by tests). The
    /// previous disposition is returned.
    pub fn set_handler(&self, signo: i32, action: SignalAction) -> Result<SignalAction, CoordError> {
        if signo <= 0 || signo >= NSIG as i32 {
            return Err(CoordError::InvalidSignal(signo));
        }
        let _guard = self.install_mutex.lock();
        Ok(self.handlers.replace(signo, action))
    }

    /// Install `action` for `signo`: OS disposition plus table entry.
    ///
    /// Only works on [`Signals::global`]: the trampoline `sigaction`
    /// points at records into the global table, so installing through a
    /// private instance would strand every delivery there. Serialized
    /// under the install mutex so a concurrent install cannot interleave
    /// the `sigaction` call and the table swap.
    pub fn install(&self, signo: i32, action: SignalAction) -> Result<SignalAction, CoordError> {
        if signo <= 0 || signo >= NSIG as i32 {
            return Err(CoordError::InvalidSignal(signo));
        }
        if !self.is_global() {
            return Err(CoordError::NotGlobalTable);
        }
        let _guard = self.install_mutex.lock();
        os::install_action(signo, &action).map_err(|e| CoordError::os("sigaction", e))?;
        Ok(self.handlers.replace(signo, action))
    }

    pub(crate) fn pending(&self) -> &PendingSignalSet {
        &self.pending
    }

    pub(crate) fn domains(&self) -> &DomainTable {
        &self.domains
    }
}

impl Default for Signals {
    fn default() -> Self {
        Signals::new()
    }
}

/// Spawn the preemption ticker: every `interval`, record the preemption
/// signal into `signals` so running domains reach a safe point and offer
/// the master lock to waiters.
pub fn spawn_preemption_ticker(signals: Arc<Signals>, interval: Duration) -> TickThread {
    TickThread::spawn(interval, move || signals.record(PREEMPTION_SIGNAL))
}

// =============================================================================
// Tests
// =============================================================================
