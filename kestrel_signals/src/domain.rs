//! Per-domain interrupt state.
//!
//! Each participating thread of execution (a *domain*) carries a small
//! block of atomics: the allocation-watermark interrupt word that worker
//! loops poll on every allocation, the sticky action-pending flag, and the
//! individual request flags the dispatcher consumes. Slots live by value
//! in a fixed table inside [`Signals`], so `interrupt_all` can walk them
//! from an OS signal handler without touching the allocator or risking a
//! freed slot.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use kestrel_core::CoordError;

use crate::signals::Signals;

/// Maximum number of concurrently registered domains.
pub const MAX_DOMAINS: usize = 128;

/// Watermark value meaning "interrupt requested": every allocation poll
/// trips, because any live heap usage is >= 0.
const WATERMARK_ARMED: usize = 0;
/// Watermark value meaning "no interrupt": unreachable by real usage.
const WATERMARK_CLEAR: usize = usize::MAX;

/// Interrupt state of one domain. All fields are atomics; any thread (or
/// signal handler) may poke them at any time.
pub struct DomainState {
    /// Slot liveness. Claimed with a CAS in [`DomainTable::claim`].
    active: AtomicBool,
    /// The word allocation polls compare against.
    alloc_watermark: AtomicUsize,
    /// Sticky "something needs dispatching" flag.
    action_pending: AtomicBool,
    requested_minor_gc: AtomicBool,
    requested_major_slice: AtomicBool,
    external_interrupt: AtomicBool,
    /// Nesting depth of blocking sections entered on this domain.
    blocking_depth: AtomicUsize,
}

impl DomainState {
    pub(crate) const INIT: DomainState = DomainState::new();

    const fn new() -> Self {
        DomainState {
            active: AtomicBool::new(false),
            alloc_watermark: AtomicUsize::new(WATERMARK_CLEAR),
            action_pending: AtomicBool::new(false),
            requested_minor_gc: AtomicBool::new(false),
            requested_major_slice: AtomicBool::new(false),
            external_interrupt: AtomicBool::new(false),
            blocking_depth: AtomicUsize::new(0),
        }
    }

    /// Arm the interrupt word and the sticky flag.
    ///
    /// Async-signal-safe: two plain atomic stores.
    #[inline]
    pub fn interrupt(&self) {
        self.alloc_watermark.store(WATERMARK_ARMED, Ordering::Release);
        self.action_pending.store(true, Ordering::Release);
    }

    /// Whether the interrupt word is armed.
    #[inline]
    pub fn interrupt_armed(&self) -> bool {
        self.alloc_watermark.load(Ordering::Acquire) == WATERMARK_ARMED
    }

    pub(crate) fn disarm_interrupt(&self) {
        self.alloc_watermark.store(WATERMARK_CLEAR, Ordering::Release);
    }

    /// Whether the sticky action-pending flag is set.
    #[inline]
    pub fn action_pending(&self) -> bool {
        self.action_pending.load(Ordering::Acquire)
    }

    /// Set the sticky flag without arming the interrupt word.
    pub fn set_action_pending(&self) {
        self.action_pending.store(true, Ordering::Release);
    }

    pub(crate) fn clear_action_pending(&self) {
        self.action_pending.store(false, Ordering::Release);
    }

    /// Request a minor collection at this domain's next safe point.
    pub fn request_minor_gc(&self) {
        self.requested_minor_gc.store(true, Ordering::Release);
        self.interrupt();
    }

    /// Request a major-heap slice at this domain's next safe point.
    pub fn request_major_slice(&self) {
        self.requested_major_slice.store(true, Ordering::Release);
        self.interrupt();
    }

    /// Ask this domain to yield the master lock at its next safe point.
    pub fn request_external_interrupt(&self) {
        self.external_interrupt.store(true, Ordering::Release);
        self.interrupt();
    }

    /// Note a yield request from within a drain already in progress.
    /// Does not re-arm the interrupt word; the current pass consumes it.
    pub(crate) fn note_external_interrupt(&self) {
        self.external_interrupt.store(true, Ordering::Release);
    }

    pub(crate) fn take_requested_minor_gc(&self) -> bool {
        self.requested_minor_gc.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_requested_major_slice(&self) -> bool {
        self.requested_major_slice.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_external_interrupt(&self) -> bool {
        self.external_interrupt.swap(false, Ordering::AcqRel)
    }

    /// Does an allocation poll with `used` bytes live trip the interrupt?
    #[inline]
    pub fn allocation_trips(&self, used: usize) -> bool {
        used >= self.alloc_watermark.load(Ordering::Acquire)
    }

    /// Current blocking-section nesting depth.
    pub fn blocking_depth(&self) -> usize {
        self.blocking_depth.load(Ordering::Acquire)
    }

    pub(crate) fn begin_blocking(&self) {
        self.blocking_depth.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the nesting depth; `false` if it was already zero.
    pub(crate) fn end_blocking(&self) -> bool {
        self.blocking_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1))
            .is_ok()
    }

    fn reset(&self) {
        self.alloc_watermark.store(WATERMARK_CLEAR, Ordering::Release);
        self.action_pending.store(false, Ordering::Release);
        self.requested_minor_gc.store(false, Ordering::Release);
        self.requested_major_slice.store(false, Ordering::Release);
        self.external_interrupt.store(false, Ordering::Release);
        self.blocking_depth.store(0, Ordering::Release);
    }
}

/// Fixed-capacity table of domain slots.
pub(crate) struct DomainTable {
    slots: [DomainState; MAX_DOMAINS],
}

impl DomainTable {
    pub(crate) const fn new() -> Self {
        DomainTable {
            slots: [DomainState::INIT; MAX_DOMAINS],
        }
    }

    /// Claim a free slot, resetting its fields. `None` when full.
    pub(crate) fn claim(&self) -> Option<usize> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .active
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                slot.reset();
                return Some(index);
            }
        }
        None
    }

    pub(crate) fn release(&self, index: usize) {
        self.slots[index].active.store(false, Ordering::Release);
    }

    pub(crate) fn get(&self, index: usize) -> &DomainState {
        &self.slots[index]
    }

    /// Arm the interrupt word of every active domain.
    ///
    /// Async-signal-safe: a bounded walk over atomics. A slot released
    /// concurrently gets a spurious interrupt, which its next claimant's
    /// reset wipes out.
    pub(crate) fn interrupt_all(&self) {
        for slot in &self.slots {
            if slot.active.load(Ordering::Acquire) {
                slot.interrupt();
            }
        }
    }
}

/// A registered domain: RAII handle over a [`DomainTable`] slot.
pub struct Domain {
    signals: Arc<Signals>,
    index: usize,
}

impl Domain {
    /// Register the calling context as a domain of `signals`.
    pub fn register(signals: &Arc<Signals>) -> Result<Self, CoordError> {
        let index = signals
            .domains()
            .claim()
            .ok_or(CoordError::TooManyDomains(MAX_DOMAINS))?;
        Ok(Domain {
            signals: Arc::clone(signals),
            index,
        })
    }

    /// This domain's interrupt state.
    #[inline]
    pub fn state(&self) -> &DomainState {
        self.signals.domains().get(self.index)
    }

    /// Slot index, for logging.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        self.signals.domains().release(self.index);
    }
}

// =============================================================================
// Tests
// =============================================================================
