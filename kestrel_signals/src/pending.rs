//! The pending-signal bit-set (the recorder).
//!
//! Bit `i - 1` means "signal `i` arrived and has not been dispatched".
//! The producer side (`record`) may run inside a real OS signal handler
//! on an arbitrary thread, so it is a single atomic fetch-or: no locks,
//! no allocation, no callbacks. The consumer side clears bits with a CAS
//! retry loop that tolerates concurrent records.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::mask::SignalSet;

/// Number of supported signals. Valid signal numbers are `1..NSIG`.
pub const NSIG: usize = 64;

pub(crate) const BITS_PER_WORD: usize = usize::BITS as usize;
pub(crate) const NSIG_WORDS: usize = (NSIG + BITS_PER_WORD - 1) / BITS_PER_WORD;

/// Process-wide set of received-but-undispatched signals.
///
/// Initialized once, never destroyed. Duplicate arrivals of the same
/// signal collapse into a single set bit, and therefore into a single
/// dispatch.
pub struct PendingSignalSet {
    words: [AtomicUsize; NSIG_WORDS],
}

impl PendingSignalSet {
    const ZERO: AtomicUsize = AtomicUsize::new(0);

    /// An empty set.
    pub const fn new() -> Self {
        PendingSignalSet {
            words: [Self::ZERO; NSIG_WORDS],
        }
    }

    /// Record the arrival of `signo`.
    ///
    /// Async-signal-safe. Out-of-range numbers are ignored (best effort,
    /// no error reporting inside a handler). Returns whether the number
    /// was in range.
    #[inline]
    pub fn record(&self, signo: i32) -> bool {
        if signo <= 0 || signo >= NSIG as i32 {
            return false;
        }
        let index = (signo - 1) as usize;
        self.words[index / BITS_PER_WORD]
            .fetch_or(1 << (index % BITS_PER_WORD), Ordering::SeqCst);
        true
    }

    /// Cheap check: is any signal recorded at all?
    #[inline]
    pub fn any_pending(&self) -> bool {
        self.words.iter().any(|w| w.load(Ordering::Relaxed) != 0)
    }

    /// Whether `signo` is currently recorded.
    pub fn is_recorded(&self, signo: i32) -> bool {
        if signo <= 0 || signo >= NSIG as i32 {
            return false;
        }
        let index = (signo - 1) as usize;
        self.words[index / BITS_PER_WORD].load(Ordering::Relaxed)
            & (1 << (index % BITS_PER_WORD))
            != 0
    }

    /// Is any recorded signal *not* in `masked`?
    ///
    /// The stricter half of the pending check: a masked-but-recorded
    /// signal must not force a drain.
    pub(crate) fn any_unmasked(&self, masked: &SignalSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .any(|(i, w)| w.load(Ordering::Relaxed) & !masked.word(i) != 0)
    }

    /// Claim the lowest recorded signal not in `masked`, clearing its bit.
    ///
    /// The CAS loop tolerates concurrent `record` calls: a bit set while
    /// we race is preserved, and a bit cleared by another consumer makes
    /// us move on. Repeated calls dispatch in ascending signal order and
    /// observe bits recorded by handlers run in between.
    pub(crate) fn take_next_unmasked(&self, masked: &SignalSet) -> Option<i32> {
        for (i, word) in self.words.iter().enumerate() {
            let mut curr = word.load(Ordering::Relaxed);
            loop {
                let eligible = curr & !masked.word(i);
                if eligible == 0 {
                    break;
                }
                let bit = eligible & eligible.wrapping_neg();
                match word.compare_exchange_weak(
                    curr,
                    curr & !bit,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let signo = i * BITS_PER_WORD + bit.trailing_zeros() as usize + 1;
                        return Some(signo as i32);
                    }
                    Err(actual) => curr = actual,
                }
            }
        }
        None
    }
}

impl Default for PendingSignalSet {
    fn default() -> Self {
        PendingSignalSet::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
