//! End-to-end dispatcher behavior: recording, draining, ordering,
//! blocking sections, masks, and preemption hand-off.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use kestrel_core::{ActionKind, AsyncResult, CallbackError, CoordError, WaitBackend};
use kestrel_signals::{
    Dispatcher, MaskHow, NoopHooks, RuntimeHooks, SignalAction, SignalSet, Signals,
    PREEMPTION_SIGNAL,
};
use kestrel_threads::MasterLock;

/// A private signal table plus a master lock held by the calling thread.
fn setup() -> (Arc<Signals>, Arc<MasterLock>, Dispatcher) {
    setup_with_hooks(Arc::new(NoopHooks))
}

fn setup_with_hooks(hooks: Arc<dyn RuntimeHooks>) -> (Arc<Signals>, Arc<MasterLock>, Dispatcher) {
    let signals = Arc::new(Signals::new());
    let lock = Arc::new(MasterLock::new(WaitBackend::default_for_target()));
    let dispatcher = Dispatcher::new(Arc::clone(&signals), Arc::clone(&lock), hooks).unwrap();
    (signals, lock, dispatcher)
}

struct LoggingHooks {
    log: Arc<Mutex<Vec<String>>>,
}

impl RuntimeHooks for LoggingHooks {
    fn collection_slice(&self, minor: bool, major: bool) {
        self.log
            .lock()
            .push(format!("collector(minor={minor},major={major})"));
    }

    fn profiling_callbacks(&self) -> AsyncResult {
        self.log.lock().push("profiling".into());
        Ok(())
    }

    fn finalizers(&self) -> AsyncResult {
        self.log.lock().push("finalizer".into());
        Ok(())
    }
}

#[test]
fn test_coalesced_records_run_handler_once() {
    let (signals, _lock, dispatcher) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    signals
        .set_handler(
            7,
            SignalAction::handle(move |signo| {
                assert_eq!(signo, 7);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    signals.record(7);
    signals.record(7);
    assert!(dispatcher.check_pending_actions());

    dispatcher.process_pending_actions().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!signals.has_pending());
    assert!(!dispatcher.check_pending_actions());

    // A second drain with nothing recorded does nothing.
    dispatcher.process_pending_actions().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handler_failure_rearms_pending_flag() {
    let (signals, _lock, dispatcher) = setup();
    signals
        .set_handler(
            5,
            SignalAction::handle(|_| Err(CallbackError::Failure("refused".into()))),
        )
        .unwrap();

    signals.record(5);
    let err = dispatcher.process_pending_actions().unwrap_err();
    assert_eq!(err.kind, ActionKind::SignalHandler);
    assert!(err.message.contains("refused"));
    // The failure left the sticky flag set for the next poll.
    assert!(dispatcher.domain().action_pending());

    // The failing arrival was consumed; the retry drain finds nothing
    // and settles the flag.
    dispatcher.process_pending_actions().unwrap();
    assert!(!dispatcher.domain().action_pending());
}

#[test]
fn test_interrupted_handler_does_not_abort_drain() {
    let (signals, _lock, dispatcher) = setup();
    let later_ran = Arc::new(AtomicBool::new(false));
    signals
        .set_handler(3, SignalAction::handle(|_| Err(CallbackError::Interrupted)))
        .unwrap();
    let flag = Arc::clone(&later_ran);
    signals
        .set_handler(
            9,
            SignalAction::handle(move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    signals.record(3);
    signals.record(9);
    // Signal 3 dispatches first (ascending order) and is swallowed;
    // signal 9 still runs in the same pass.
    dispatcher.process_pending_actions().unwrap();
    assert!(later_ran.load(Ordering::SeqCst));
    assert!(!dispatcher.domain().action_pending());
}

#[test]
fn test_drain_runs_categories_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let hooks = Arc::new(LoggingHooks {
        log: Arc::clone(&log),
    });
    let (signals, _lock, dispatcher) = setup_with_hooks(hooks);

    let sink = Arc::clone(&log);
    signals
        .set_handler(
            2,
            SignalAction::handle(move |signo| {
                sink.lock().push(format!("signal({signo})"));
                Ok(())
            }),
        )
        .unwrap();

    dispatcher.domain().request_minor_gc();
    signals.record(2);
    dispatcher.process_pending_actions().unwrap();

    assert_eq!(
        log.lock().as_slice(),
        &[
            "collector(minor=true,major=false)",
            "signal(2)",
            "profiling",
            "finalizer",
        ]
    );
}

#[test]
fn test_alloc_poll_trips_only_when_armed() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let hooks = Arc::new(LoggingHooks {
        log: Arc::clone(&log),
    });
    let (_signals, _lock, dispatcher) = setup_with_hooks(hooks);

    dispatcher.alloc_poll(1 << 20).unwrap();
    assert!(log.lock().is_empty());

    dispatcher.domain().request_major_slice();
    dispatcher.alloc_poll(0).unwrap();
    assert_eq!(
        log.lock().first().map(String::as_str),
        Some("collector(minor=false,major=true)")
    );
    assert!(!dispatcher.domain().interrupt_armed());
}

#[test]
fn test_external_interrupt_hands_lock_to_waiter() {
    let (_signals, lock, dispatcher) = setup();
    let acquired = Arc::new(AtomicBool::new(false));

    let waiter = {
        let lock = Arc::clone(&lock);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            lock.acquire();
            acquired.store(true, Ordering::SeqCst);
            lock.release();
        })
    };

    while lock.waiter_count() == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    dispatcher.domain().request_external_interrupt();
    dispatcher.process_pending_actions().unwrap();
    // The yield completed before the drain returned.
    assert!(acquired.load(Ordering::SeqCst));
    waiter.join().unwrap();
}

#[test]
fn test_external_interrupt_without_waiters_is_consumed() {
    let (_signals, lock, dispatcher) = setup();
    dispatcher.domain().request_external_interrupt();
    dispatcher.process_pending_actions().unwrap();
    assert!(!dispatcher.check_pending_actions());
    assert_eq!(lock.waiter_count(), 0);
}

#[test]
fn test_preemption_signal_becomes_yield_request() {
    let (signals, lock, dispatcher) = setup();
    let acquired = Arc::new(AtomicBool::new(false));

    let waiter = {
        let lock = Arc::clone(&lock);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            lock.acquire();
            acquired.store(true, Ordering::SeqCst);
            lock.release();
        })
    };

    while lock.waiter_count() == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    // What the tick thread does each quantum.
    signals.record(PREEMPTION_SIGNAL);
    dispatcher.process_pending_actions().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert!(!signals.has_pending());
    waiter.join().unwrap();
}

#[test]
fn test_blocking_section_releases_and_reacquires_lock() {
    let (_signals, lock, dispatcher) = setup();
    let acquired = Arc::new(AtomicBool::new(false));

    let waiter = {
        let lock = Arc::clone(&lock);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            lock.acquire();
            acquired.store(true, Ordering::SeqCst);
            lock.release();
        })
    };

    let observed = dispatcher
        .blocking_section(|| {
            // The token is free while we "block"; the waiter gets in.
            while !acquired.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            true
        })
        .unwrap();
    assert!(observed);
    waiter.join().unwrap();

    // We hold the token again.
    lock.release();
    lock.acquire();
}

#[test]
fn test_enter_blocking_section_drains_first() {
    let (signals, _lock, dispatcher) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    signals
        .set_handler(
            11,
            SignalAction::handle(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    signals.record(11);
    dispatcher.enter_blocking_section().unwrap();
    // The handler ran before the token was surrendered.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    dispatcher.leave_blocking_section().unwrap();
}

#[test]
fn test_leave_without_enter_is_an_error() {
    let (_signals, _lock, dispatcher) = setup();
    assert!(matches!(
        dispatcher.leave_blocking_section(),
        Err(CoordError::NotInBlockingSection)
    ));
    // The protocol error left nothing broken.
    dispatcher.blocking_section(|| ()).unwrap();
}

#[test]
fn test_blocking_sections_nest() {
    let (_signals, _lock, dispatcher) = setup();
    dispatcher.enter_blocking_section().unwrap();
    dispatcher.enter_blocking_section().unwrap();
    assert_eq!(dispatcher.domain().blocking_depth(), 2);
    dispatcher.leave_blocking_section().unwrap();
    dispatcher.leave_blocking_section().unwrap();
    assert!(matches!(
        dispatcher.leave_blocking_section(),
        Err(CoordError::NotInBlockingSection)
    ));
}

#[test]
fn test_install_rejects_invalid_signal() {
    let (_signals, _lock, dispatcher) = setup();
    assert!(matches!(
        dispatcher.install(0, SignalAction::Ignore),
        Err(CoordError::InvalidSignal(0))
    ));
    assert!(matches!(
        dispatcher.install(-4, SignalAction::Ignore),
        Err(CoordError::InvalidSignal(-4))
    ));
}

#[test]
fn test_install_requires_global_table() {
    // setup() builds a private table; OS installation through it would
    // point the trampoline at a table this dispatcher never drains.
    let (signals, _lock, dispatcher) = setup();
    assert!(matches!(
        dispatcher.install(12, SignalAction::Ignore),
        Err(CoordError::NotGlobalTable)
    ));
    assert!(matches!(signals.handler(12), SignalAction::Default));
}

#[cfg(unix)]
#[test]
fn test_os_delivered_signal_runs_installed_handler() {
    // The full path: install -> kernel delivery -> trampoline -> record
    // -> allocation-poll trip -> drain -> callback.
    let signals = Arc::clone(Signals::global());
    let lock = Arc::new(MasterLock::new(WaitBackend::default_for_target()));
    let dispatcher = Dispatcher::new(signals, lock, Arc::new(NoopHooks)).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    dispatcher
        .install(
            libc::SIGUSR2,
            SignalAction::handle(move |signo| {
                assert_eq!(signo, libc::SIGUSR2);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    unsafe {
        libc::raise(libc::SIGUSR2);
    }
    // The trampoline ran synchronously: the arrival is recorded and this
    // dispatcher's domain is armed.
    assert!(dispatcher.signals().has_pending());
    assert!(dispatcher.check_pending_actions());

    dispatcher.process_pending_actions().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!dispatcher.signals().has_pending());

    // Put the OS disposition back.
    dispatcher.install(libc::SIGUSR2, SignalAction::Default).unwrap();
}

#[cfg(unix)]
#[test]
fn test_masked_signal_waits_for_unblock() {
    let (signals, _lock, dispatcher) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    signals
        .set_handler(
            2,
            SignalAction::handle(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

    dispatcher.set_mask(MaskHow::Block, &SignalSet::of(&[2])).unwrap();
    signals.record(2);

    // Masked: the drain must leave the arrival parked.
    dispatcher.process_pending_actions().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(signals.has_pending());

    // Unblocking dispatches it before set_mask returns.
    dispatcher
        .set_mask(MaskHow::Unblock, &SignalSet::of(&[2]))
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!signals.has_pending());
}

#[cfg(unix)]
#[test]
fn test_wait_for_one_returns_delivered_signal() {
    let (_signals, _lock, dispatcher) = setup();
    let set = SignalSet::of(&[libc::SIGUSR1]);

    // Mask first so the raise stays pending at the OS level instead of
    // running the default disposition.
    dispatcher.set_mask(MaskHow::Block, &set).unwrap();
    unsafe {
        libc::raise(libc::SIGUSR1);
    }

    let signo = dispatcher.wait_for_one(&set).unwrap();
    assert_eq!(signo, libc::SIGUSR1);
}
