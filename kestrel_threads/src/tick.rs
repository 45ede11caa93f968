//! The tick thread: periodic cooperative-preemption requests.
//!
//! A detached-style background thread that sleeps for a fixed quantum and
//! then invokes an injected callback (in the assembled runtime, recording
//! the preemption pseudo-signal). It never calls into program code;
//! preemption only takes effect when a worker's next allocation poll
//! drains pending actions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kestrel_core::fatal_error;

/// Handle to the background preemption-tick thread.
///
/// Shutdown is one-way: the stop flag is set once and the thread exits on
/// its next wake. In-flight sleeps are not interrupted.
pub struct TickThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickThread {
    /// Spawn the tick thread.
    ///
    /// `on_tick` runs once per quantum on the tick thread; it must be
    /// async-signal-safe in spirit (no blocking, no program callbacks) —
    /// in practice it is the signal recorder. Aborts the process if the
    /// OS refuses to create the thread.
    pub fn spawn(interval: Duration, on_tick: impl Fn() + Send + 'static) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("kestrel-tick".into())
            .spawn(move || {
                // Keep OS signal delivery away from this thread; it only
                // ever *requests* preemption, it never handles anything.
                block_all_signals();
                tracing::debug!(interval_ms = interval.as_millis() as u64, "tick thread started");
                while !thread_stop.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    on_tick();
                }
                tracing::debug!("tick thread stopped");
            })
            .unwrap_or_else(|e| fatal_error(&format!("failed to spawn tick thread: {e}")));

        TickThread {
            stop,
            handle: Some(handle),
        }
    }

    /// Request shutdown and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            // Best effort: a panicking tick closure has already logged.
            let _ = handle.join();
        }
    }
}

impl Drop for TickThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(unix)]
fn block_all_signals() {
    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigfillset(&mut mask);
        libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
fn block_all_signals() {}

// =============================================================================
// Tests
// =============================================================================
