//! Blocking-section hook points.
//!
//! Entering a blocking section surrenders the execution token; leaving it
//! takes the token back. The hook trait lets a threading layer wedge its
//! own bookkeeping around the hand-off (saving per-thread runtime state
//! before release, restoring it after reacquisition).

use std::sync::Arc;

use kestrel_threads::MasterLock;

/// Callbacks run around the master-lock hand-off of a blocking section.
///
/// `enter` runs with the token held and must release it; `leave` runs
/// without the token and must reacquire it before returning.
pub trait BlockingHooks: Send + Sync {
    /// Release the execution token (blocking section begins).
    fn enter(&self);
    /// Reacquire the execution token (blocking section ends).
    fn leave(&self);
}

/// The default hooks: a bare release/acquire of the master lock.
pub struct MasterLockHooks {
    lock: Arc<MasterLock>,
}

impl MasterLockHooks {
    /// Hooks over `lock`.
    pub fn new(lock: Arc<MasterLock>) -> Self {
        MasterLockHooks { lock }
    }
}

impl BlockingHooks for MasterLockHooks {
    fn enter(&self) {
        self.lock.release();
    }

    fn leave(&self) {
        self.lock.acquire();
    }
}
