//! Plain (non-atomic) signal sets and mask operations.
//!
//! `SignalSet` is the value type passed to mask queries and updates; it
//! mirrors the bit layout of [`PendingSignalSet`](crate::PendingSignalSet)
//! so the two can be intersected word by word.

use smallvec::SmallVec;

use crate::pending::{BITS_PER_WORD, NSIG, NSIG_WORDS};

/// How a mask update combines with the thread's current mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskHow {
    /// Replace the mask wholesale.
    Set,
    /// Add the given signals to the mask.
    Block,
    /// Remove the given signals from the mask.
    Unblock,
}

/// An immutable-by-convention set of signal numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalSet {
    words: [usize; NSIG_WORDS],
}

impl SignalSet {
    /// The empty set.
    pub const fn empty() -> Self {
        SignalSet {
            words: [0; NSIG_WORDS],
        }
    }

    /// Build a set from a slice of signal numbers.
    ///
    /// Out-of-range numbers are skipped.
    pub fn of(signals: &[i32]) -> Self {
        let mut set = SignalSet::empty();
        for &signo in signals {
            set.add(signo);
        }
        set
    }

    /// Add `signo`. Out-of-range numbers are ignored.
    pub fn add(&mut self, signo: i32) {
        if signo <= 0 || signo >= NSIG as i32 {
            return;
        }
        let index = (signo - 1) as usize;
        self.words[index / BITS_PER_WORD] |= 1 << (index % BITS_PER_WORD);
    }

    /// Remove `signo`. Out-of-range numbers are ignored.
    pub fn remove(&mut self, signo: i32) {
        if signo <= 0 || signo >= NSIG as i32 {
            return;
        }
        let index = (signo - 1) as usize;
        self.words[index / BITS_PER_WORD] &= !(1 << (index % BITS_PER_WORD));
    }

    /// Whether `signo` is in the set.
    pub fn contains(&self, signo: i32) -> bool {
        if signo <= 0 || signo >= NSIG as i32 {
            return false;
        }
        let index = (signo - 1) as usize;
        self.words[index / BITS_PER_WORD] & (1 << (index % BITS_PER_WORD)) != 0
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// The members in ascending order.
    pub fn signals(&self) -> SmallVec<[i32; 8]> {
        let mut out = SmallVec::new();
        for signo in 1..NSIG as i32 {
            if self.contains(signo) {
                out.push(signo);
            }
        }
        out
    }

    #[inline]
    pub(crate) fn word(&self, index: usize) -> usize {
        self.words[index]
    }
}

// =============================================================================
// Tests
// =============================================================================
