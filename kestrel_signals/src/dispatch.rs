//! The pending-action dispatcher.
//!
//! A `Dispatcher` is the per-worker front end of the coordination core: it
//! owns the worker's [`Domain`] slot and turns armed interrupts into actual
//! work at safe points. One drain pass runs the action categories in a
//! fixed order:
//!
//! 1. collector interrupts (disarm the watermark, run requested slices),
//! 2. clear the sticky action-pending flag,
//! 3. pending signal handlers, then profiling callbacks, then finalizers,
//! 4. at most one external yield request, last, so a preempted worker has
//!    already retired its own work before offering the lock.
//!
//! Clearing the flag *before* step 3 means a request arriving mid-drain
//! re-arms it and gets a fresh pass; a failure in step 3 re-arms it too,
//! so nothing is lost when the failure propagates.

use std::sync::Arc;

use kestrel_core::{ActionKind, AsyncResult, CallbackError, CoordError, DrainError};

use kestrel_threads::MasterLock;

use crate::blocking::{BlockingHooks, MasterLockHooks};
use crate::domain::{Domain, DomainState};
use crate::handlers::SignalAction;
use crate::mask::{MaskHow, SignalSet};
use crate::os;
use crate::signals::Signals;
use crate::PREEMPTION_SIGNAL;

// =============================================================================
// Runtime Hooks
// =============================================================================

/// Runtime services the dispatcher invokes during a drain.
///
/// The coordination core does not implement collection, profiling, or
/// finalization; the embedding runtime provides them here. All hooks run
/// with the master lock held.
pub trait RuntimeHooks: Send + Sync {
    /// Run the requested collection work. Infallible from the
    /// dispatcher's point of view; collection never raises into a drain.
    fn collection_slice(&self, minor: bool, major: bool) {
        let _ = (minor, major);
    }

    /// Run due profiling callbacks.
    fn profiling_callbacks(&self) -> AsyncResult {
        Ok(())
    }

    /// Run due finalizers.
    fn finalizers(&self) -> AsyncResult {
        Ok(())
    }
}

/// Hooks that do nothing; for runtimes (and tests) without a collector.
pub struct NoopHooks;

impl RuntimeHooks for NoopHooks {}

// =============================================================================
// Dispatcher
// =============================================================================

/// Per-worker dispatcher over shared [`Signals`] state.
///
/// Every method that can run callbacks requires the calling thread to
/// hold the master lock, mirroring the rule that callbacks are ordinary
/// program code.
pub struct Dispatcher {
    signals: Arc<Signals>,
    domain: Domain,
    lock: Arc<MasterLock>,
    hooks: Arc<dyn RuntimeHooks>,
    blocking_hooks: Arc<dyn BlockingHooks>,
}

impl Dispatcher {
    /// Register a domain and build its dispatcher, using the plain
    /// master-lock hand-off for blocking sections.
    pub fn new(
        signals: Arc<Signals>,
        lock: Arc<MasterLock>,
        hooks: Arc<dyn RuntimeHooks>,
    ) -> Result<Self, CoordError> {
        let blocking_hooks = Arc::new(MasterLockHooks::new(Arc::clone(&lock)));
        Self::with_blocking_hooks(signals, lock, hooks, blocking_hooks)
    }

    /// Like [`new`](Self::new), with custom blocking-section hooks.
    pub fn with_blocking_hooks(
        signals: Arc<Signals>,
        lock: Arc<MasterLock>,
        hooks: Arc<dyn RuntimeHooks>,
        blocking_hooks: Arc<dyn BlockingHooks>,
    ) -> Result<Self, CoordError> {
        let domain = Domain::register(&signals)?;
        tracing::debug!(domain = domain.index(), "dispatcher registered");
        Ok(Dispatcher {
            signals,
            domain,
            lock,
            hooks,
            blocking_hooks,
        })
    }

    /// The shared signal table.
    pub fn signals(&self) -> &Arc<Signals> {
        &self.signals
    }

    /// This worker's interrupt state.
    #[inline]
    pub fn domain(&self) -> &DomainState {
        self.domain.state()
    }

    /// The master lock this worker participates in.
    pub fn master_lock(&self) -> &Arc<MasterLock> {
        &self.lock
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Would a drain do anything right now?
    #[inline]
    pub fn check_pending_actions(&self) -> bool {
        let d = self.domain.state();
        d.interrupt_armed() || d.action_pending()
    }

    /// Allocation poll: drain if the interrupt watermark trips.
    ///
    /// `used` is the domain's current heap usage; with the watermark
    /// armed any value trips. Called on the allocation slow path.
    #[inline]
    pub fn alloc_poll(&self, used: usize) -> Result<(), DrainError> {
        if self.domain.state().allocation_trips(used) {
            self.process_pending_actions()
        } else {
            Ok(())
        }
    }

    /// Drain pending actions if any are flagged; idempotent when none are.
    pub fn process_pending_actions(&self) -> Result<(), DrainError> {
        if !self.check_pending_actions() {
            return Ok(());
        }
        self.do_pending_actions()
    }

    fn do_pending_actions(&self) -> Result<(), DrainError> {
        let d = self.domain.state();
        self.handle_interrupts();
        // Clear before running callbacks: a request arriving while they
        // run re-arms the flag and is picked up by the next poll.
        d.clear_action_pending();
        if let Err(err) = self.run_delayable_actions() {
            tracing::error!(error = %err, "pending-action drain failed");
            d.set_action_pending();
            return Err(err);
        }
        Ok(())
    }

    fn run_delayable_actions(&self) -> Result<(), DrainError> {
        self.process_pending_signals()?;
        checked(self.hooks.profiling_callbacks(), ActionKind::Profiling)?;
        checked(self.hooks.finalizers(), ActionKind::Finalizer)?;
        self.process_external_interrupt();
        Ok(())
    }

    /// Disarm the interrupt word and run requested collection work.
    fn handle_interrupts(&self) {
        let d = self.domain.state();
        d.disarm_interrupt();
        let minor = d.take_requested_minor_gc();
        let major = d.take_requested_major_slice();
        if minor || major {
            self.hooks.collection_slice(minor, major);
        }
    }

    // =========================================================================
    // Signal execution
    // =========================================================================

    /// Run handlers for every dispatchable recorded signal.
    ///
    /// Signals masked on the calling thread stay recorded for a thread
    /// that can take them. Each claimed bit observes handlers installed
    /// and signals recorded since the previous iteration.
    pub fn process_pending_signals(&self) -> Result<(), DrainError> {
        if !self.signals.check_pending() {
            return Ok(());
        }
        let masked = os::current_mask();
        while let Some(signo) = self.signals.pending().take_next_unmasked(&masked) {
            self.execute_signal(signo)?;
        }
        Ok(())
    }

    fn execute_signal(&self, signo: i32) -> Result<(), DrainError> {
        if signo == PREEMPTION_SIGNAL {
            // The tick thread's nudge is not a program signal; it becomes
            // the yield request this same pass processes last.
            self.domain.state().note_external_interrupt();
            return Ok(());
        }
        let handler = match self.signals.handler(signo) {
            SignalAction::Handle(handler) => handler,
            // Dispositions removed after recording: drop the bit.
            SignalAction::Default | SignalAction::Ignore => return Ok(()),
        };
        // Mask the signal while its handler runs so a concurrent OS
        // delivery cannot nest inside it; re-records still coalesce into
        // the bit set for the next iteration.
        let _masked = os::BlockedSignal::new(signo);
        match handler(signo) {
            Ok(()) => Ok(()),
            Err(CallbackError::Interrupted) => {
                tracing::trace!(signo, "handler interrupted; drain continues");
                Ok(())
            }
            Err(CallbackError::Failure(message)) => {
                Err(DrainError::new(ActionKind::SignalHandler, message))
            }
        }
    }

    /// Consume one external yield request, handing the master lock to a
    /// waiter if any thread is actually blocked on it.
    fn process_external_interrupt(&self) {
        if self.domain.state().take_external_interrupt() && self.lock.waiter_count() > 0 {
            self.lock.yield_to_waiter();
        }
    }

    // =========================================================================
    // Blocking sections
    // =========================================================================

    /// Enter a blocking section: retire this domain's pending work, then
    /// surrender the execution token.
    ///
    /// The pre-drain loop repeats until no interrupt is armed and no
    /// dispatchable signal remains, so a signal recorded between the
    /// check and the hand-off is not silently parked behind a thread
    /// that is about to sleep in a syscall.
    pub fn enter_blocking_section(&self) -> Result<(), CoordError> {
        let d = self.domain.state();
        while d.interrupt_armed() || (d.action_pending() && self.signals.check_pending()) {
            self.handle_interrupts();
            self.process_pending_signals().map_err(|err| {
                d.set_action_pending();
                CoordError::Async(err)
            })?;
        }
        d.begin_blocking();
        self.blocking_hooks.enter();
        Ok(())
    }

    /// Leave a blocking section: reacquire the execution token.
    ///
    /// Preserves errno across the reacquisition, so a caller that just
    /// returned from a failed syscall can still read the real error code
    /// after this returns. Pending work noticed on the way in is flagged,
    /// not run; it is dispatched at the caller's next poll point.
    pub fn leave_blocking_section(&self) -> Result<(), CoordError> {
        let d = self.domain.state();
        if !d.end_blocking() {
            return Err(CoordError::NotInBlockingSection);
        }
        let saved_errno = os::errno();
        self.blocking_hooks.leave();
        // Signals taken by nobody while this thread was out, or unmasked
        // by a mask change inside the section, must not sit unnoticed
        // until the next tick.
        if self.signals.check_pending() {
            d.set_action_pending();
        }
        os::set_errno(saved_errno);
        Ok(())
    }

    /// Run `f` inside a blocking section.
    pub fn blocking_section<R>(&self, f: impl FnOnce() -> R) -> Result<R, CoordError> {
        self.enter_blocking_section()?;
        let result = f();
        self.leave_blocking_section()?;
        Ok(result)
    }

    // =========================================================================
    // Installation, masking, synchronous wait
    // =========================================================================

    /// Install a disposition for `signo` (OS handler plus table entry),
    /// then drain: the new handler may apply to an already-recorded
    /// arrival of `signo`.
    pub fn install(&self, signo: i32, action: SignalAction) -> Result<SignalAction, CoordError> {
        let previous = self.signals.install(signo, action)?;
        self.process_pending_actions()?;
        Ok(previous)
    }

    /// Update the calling thread's signal mask, returning the previous
    /// mask.
    ///
    /// Runs inside a blocking section (mask syscalls do not need the
    /// token), then drains: unblocking a recorded signal makes its
    /// handler run before this returns.
    pub fn set_mask(&self, how: MaskHow, set: &SignalSet) -> Result<SignalSet, CoordError> {
        self.enter_blocking_section()?;
        let outcome = os::set_thread_mask(how, set);
        self.leave_blocking_section()?;
        let previous = outcome.map_err(|e| CoordError::os("pthread_sigmask", e))?;
        self.process_pending_actions()?;
        Ok(previous)
    }

    /// Block until one of `set` is delivered to this thread; returns the
    /// signal number without running its handler or recording it.
    ///
    /// The caller must have the members of `set` masked (via
    /// [`set_mask`](Self::set_mask)). The wait runs inside a blocking
    /// section so other workers keep executing.
    pub fn wait_for_one(&self, set: &SignalSet) -> Result<i32, CoordError> {
        self.enter_blocking_section()?;
        let outcome = os::sigwait(set);
        self.leave_blocking_section()?;
        outcome.map_err(|e| CoordError::os("sigwait", e))
    }
}

#[inline]
fn checked(result: AsyncResult, kind: ActionKind) -> Result<(), DrainError> {
    match result {
        Ok(()) => Ok(()),
        Err(CallbackError::Interrupted) => {
            tracing::trace!(%kind, "callback interrupted; drain continues");
            Ok(())
        }
        Err(CallbackError::Failure(message)) => Err(DrainError::new(kind, message)),
    }
}
