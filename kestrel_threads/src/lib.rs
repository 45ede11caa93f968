//! Thread substrate for the Kestrel runtime.
//!
//! Worker threads take turns executing program code under a single
//! logical token, the master lock. This crate provides the pieces that
//! token is built from:
//!
//! - **`condvar`** — a counter-based condition variable backed by a Linux
//!   futex where available, with a native fallback. The counter design
//!   sidesteps a known lost-wakeup defect in glibc's condition variables
//!   under high contention.
//! - **`masterlock`** — the token itself: a mutex-protected busy flag
//!   with a waiter count and an optimized direct hand-off (`yield`).
//! - **`tick`** — the background thread that periodically requests
//!   cooperative preemption.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod condvar;
pub mod masterlock;
pub mod tick;

pub use condvar::CustomCondvar;
pub use masterlock::MasterLock;
pub use tick::TickThread;
