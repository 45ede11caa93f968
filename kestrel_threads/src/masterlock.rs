//! The master lock: the single token required to execute program code.
//!
//! At most one thread holds the token at a time. The lock is held for
//! long stretches (a worker keeps it while running program code), so the
//! implementation is deliberately not a plain mutex: a busy flag guarded
//! by a short-lived mutex, a counter-based condvar for sleeping waiters,
//! and a waiter count that supports an optimized direct hand-off.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use kestrel_core::WaitBackend;

use crate::condvar::CustomCondvar;

struct LockState {
    /// Whether some thread currently holds the execution token.
    busy: bool,
}

/// The execution token shared by all worker threads.
///
/// Created **held** by the constructing thread, matching runtime startup:
/// the thread that brings the runtime up is the first to run program code.
pub struct MasterLock {
    inner: Mutex<LockState>,
    /// Number of threads blocked in [`acquire`](Self::acquire) or
    /// [`yield_to_waiter`](Self::yield_to_waiter). Read without the mutex
    /// as a fast-path hint only.
    waiters: AtomicU32,
    /// Signaled when the token becomes free.
    is_free: CustomCondvar,
}

impl MasterLock {
    /// Create the lock, held by the calling thread.
    pub fn new(backend: WaitBackend) -> Self {
        MasterLock {
            inner: Mutex::new(LockState { busy: true }),
            waiters: AtomicU32::new(0),
            is_free: CustomCondvar::new(backend),
        }
    }

    /// Block until the token is free, then take it.
    ///
    /// Wakeup order among waiters is implementation-defined; only
    /// eventual acquisition is guaranteed.
    pub fn acquire(&self) {
        let mut state = self.inner.lock();
        while state.busy {
            self.waiters.fetch_add(1, Ordering::Relaxed);
            state = self.is_free.wait(&self.inner, state);
            self.waiters.fetch_sub(1, Ordering::Relaxed);
        }
        state.busy = true;
    }

    /// Release the token and wake one waiter.
    ///
    /// After this returns the caller must not touch program state until
    /// it reacquires the token.
    pub fn release(&self) {
        {
            let mut state = self.inner.lock();
            state.busy = false;
        }
        self.is_free.signal();
    }

    /// Hand the token directly to a waiter, if there is one.
    ///
    /// The caller must hold the token. A bare `release(); acquire();`
    /// leaves the releasing thread racing the waiter it just woke, which
    /// under an unfair scheduler turns the hand-off into lock bouncing.
    /// Instead the yielding thread wakes a waiter and then goes to sleep
    /// itself before retaking the token, so the woken thread acquires
    /// uncontested. Returns holding the token again.
    pub fn yield_to_waiter(&self) {
        let mut state = self.inner.lock();
        debug_assert!(state.busy, "yield_to_waiter requires the token");

        // The caller usually checks waiter_count() first, but that read
        // races registration; re-check under the mutex. With no waiter
        // there is nothing to hand off and nobody to wake us back up.
        if self.waiters.load(Ordering::Relaxed) == 0 {
            return;
        }

        state.busy = false;
        self.is_free.signal();
        self.waiters.fetch_add(1, Ordering::Relaxed);
        // The signal above cannot pair with the wait below: the wait
        // snapshots the wake counter after the increment, so we sleep
        // until the *next* release or yield.
        loop {
            state = self.is_free.wait(&self.inner, state);
            if !state.busy {
                break;
            }
        }
        state.busy = true;
        self.waiters.fetch_sub(1, Ordering::Relaxed);
    }

    /// Lock-free hint of how many threads are blocked waiting.
    #[inline]
    pub fn waiter_count(&self) -> u32 {
        self.waiters.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn new_released(backend: WaitBackend) -> Arc<MasterLock> {
        let lock = Arc::new(MasterLock::new(backend));
        lock.release();
        lock
    }

    #[test]
    fn test_new_lock_is_held() {
        let lock = MasterLock::new(WaitBackend::default_for_target());
        // The creator holds the token; releasing and reacquiring works.
        lock.release();
        lock.acquire();
        lock.release();
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = new_released(WaitBackend::default_for_target());
        let in_critical = Arc::new(AtomicBool::new(false));
        let entries = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let in_critical = Arc::clone(&in_critical);
                let entries = Arc::clone(&entries);
                thread::spawn(move || {
                    for _ in 0..200 {
                        lock.acquire();
                        assert!(!in_critical.swap(true, Ordering::SeqCst));
                        entries.fetch_add(1, Ordering::SeqCst);
                        in_critical.store(false, Ordering::SeqCst);
                        lock.release();
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(entries.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn test_yield_with_no_waiters_returns_immediately() {
        let lock = MasterLock::new(WaitBackend::default_for_target());
        assert_eq!(lock.waiter_count(), 0);
        // Held, no waiters: must not block.
        lock.yield_to_waiter();
        // Still held afterwards.
        lock.release();
    }

    #[test]
    fn test_yield_hands_off_to_waiter() {
        let lock = Arc::new(MasterLock::new(WaitBackend::default_for_target()));
        let acquired_by_b = Arc::new(AtomicBool::new(false));

        let b = {
            let lock = Arc::clone(&lock);
            let acquired_by_b = Arc::clone(&acquired_by_b);
            thread::spawn(move || {
                lock.acquire();
                acquired_by_b.store(true, Ordering::SeqCst);
                lock.release();
            })
        };

        // Wait until B is registered as a waiter.
        while lock.waiter_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        lock.yield_to_waiter();
        // B's acquire completed before our yield returned.
        assert!(acquired_by_b.load(Ordering::SeqCst));
        // We hold the token again.
        lock.release();
        b.join().unwrap();
    }

    #[test]
    fn test_waiter_count_tracks_blocked_threads() {
        let lock = Arc::new(MasterLock::new(WaitBackend::default_for_target()));
        let b = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.acquire();
                lock.release();
            })
        };
        while lock.waiter_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(lock.waiter_count(), 1);
        lock.release();
        b.join().unwrap();
        assert_eq!(lock.waiter_count(), 0);
    }
}
