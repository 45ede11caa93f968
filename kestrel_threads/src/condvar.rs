//! Counter-based condition variable.
//!
//! A `CustomCondvar` owns no threads and no queue; it is purely a wake
//! generation counter. `wait` snapshots the counter, releases the paired
//! mutex, blocks until the counter's value changes, then reacquires the
//! mutex. `signal`/`broadcast` increment the counter before waking, so a
//! wake that races a wait is never lost: either the waiter snapshots the
//! old value and the futex wait returns immediately, or it snapshots the
//! new value and the earlier wake was already consumed by the state the
//! caller re-checks under the mutex.
//!
//! This exists because the master lock must never lose a wakeup, and
//! glibc's condition variables have a known defect where signal and wait
//! can race on internal sequence numbers under specific thread counts
//! (sourceware bug 25847). The counter scheme does not depend on any
//! native condvar's internal invariants.
//!
//! Spurious returns from `wait` are allowed; callers loop on their
//! predicate.

use parking_lot::{Condvar, Mutex, MutexGuard};

use kestrel_core::WaitBackend;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// Futex Backend (Linux)
// =============================================================================

#[cfg(target_os = "linux")]
mod futex {
    use super::*;

    /// Block until `word` no longer holds `expected` (or a spurious wake).
    pub(super) fn wait(word: &AtomicU32, expected: u32) {
        // EAGAIN (value changed before we slept) and EINTR are both fine:
        // the caller re-checks its predicate under the mutex.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                expected,
                std::ptr::null::<libc::timespec>(),
            );
        }
    }

    /// Wake up to `count` waiters blocked on `word`.
    pub(super) fn wake(word: &AtomicU32, count: i32) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                count,
            );
        }
    }
}

#[cfg(target_os = "linux")]
struct FutexCondvar {
    counter: AtomicU32,
}

#[cfg(target_os = "linux")]
impl FutexCondvar {
    fn new() -> Self {
        FutexCondvar {
            counter: AtomicU32::new(0),
        }
    }

    fn wait<'a, T>(&self, mutex: &'a Mutex<T>, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let snapshot = self.counter.load(Ordering::Acquire);
        drop(guard);
        futex::wait(&self.counter, snapshot);
        mutex.lock()
    }

    fn signal(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
        futex::wake(&self.counter, 1);
    }

    fn broadcast(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
        futex::wake(&self.counter, i32::MAX);
    }
}

// =============================================================================
// Native Backend
// =============================================================================

struct NativeCondvar {
    cond: Condvar,
}

impl NativeCondvar {
    fn new() -> Self {
        NativeCondvar {
            cond: Condvar::new(),
        }
    }

    fn wait<'a, T>(&self, mut guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.cond.wait(&mut guard);
        guard
    }
}

// =============================================================================
// CustomCondvar
// =============================================================================

enum Backend {
    #[cfg(target_os = "linux")]
    Futex(FutexCondvar),
    Native(NativeCondvar),
}

/// Wait primitive for the master lock.
///
/// Backed by a futex counter on Linux, by the platform condition variable
/// elsewhere (or when explicitly configured).
pub struct CustomCondvar {
    backend: Backend,
}

impl CustomCondvar {
    /// Create a condition variable with the requested backend.
    ///
    /// Requesting [`WaitBackend::Futex`] on a platform without futexes
    /// silently falls back to the native backend.
    pub fn new(backend: WaitBackend) -> Self {
        let backend = match backend {
            #[cfg(target_os = "linux")]
            WaitBackend::Futex => Backend::Futex(FutexCondvar::new()),
            #[cfg(not(target_os = "linux"))]
            WaitBackend::Futex => Backend::Native(NativeCondvar::new()),
            WaitBackend::Native => Backend::Native(NativeCondvar::new()),
        };
        CustomCondvar { backend }
    }

    /// Atomically release `guard`, block until woken, and reacquire.
    ///
    /// The caller must hold `guard` on `mutex`. May return spuriously.
    pub fn wait<'a, T>(&self, mutex: &'a Mutex<T>, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::Futex(f) => f.wait(mutex, guard),
            Backend::Native(n) => {
                let _ = mutex;
                n.wait(guard)
            }
        }
    }

    /// Wake one waiter.
    pub fn signal(&self) {
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::Futex(f) => f.signal(),
            Backend::Native(n) => {
                n.cond.notify_one();
            }
        }
    }

    /// Wake all waiters.
    pub fn broadcast(&self) {
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::Futex(f) => f.broadcast(),
            Backend::Native(n) => {
                n.cond.notify_all();
            }
        }
    }
}

impl Default for CustomCondvar {
    fn default() -> Self {
        CustomCondvar::new(WaitBackend::default_for_target())
    }
}

// =============================================================================
// Tests
// =============================================================================
