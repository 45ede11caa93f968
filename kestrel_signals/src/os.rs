//! OS signal plumbing: `sigaction`, thread masks, `sigwait`, errno.
//!
//! Everything here converges on one rule: the installed OS handler is a
//! single trampoline that records into the global [`Signals`] table and
//! preserves errno. All policy lives above this module.

#[cfg(unix)]
pub(crate) use unix::*;

#[cfg(not(unix))]
pub(crate) use fallback::*;

#[cfg(unix)]
mod unix {
    use std::io;
    use std::mem;

    use crate::handlers::SignalAction;
    use crate::mask::{MaskHow, SignalSet};
    use crate::pending::NSIG;
    use crate::signals::Signals;

    /// The one OS-level handler ever installed.
    ///
    /// Async-signal-safe: records the signal number into the global
    /// pending set, arms active domains, and restores errno. The
    /// `try_global` lookup is a single atomic load; installation goes
    /// through the global instance, so it never observes `None` here.
    extern "C" fn record_trampoline(signo: libc::c_int) {
        let saved = errno();
        if let Some(signals) = Signals::try_global() {
            signals.record(signo);
        }
        set_errno(saved);
    }

    fn to_sigset(set: &SignalSet) -> libc::sigset_t {
        unsafe {
            let mut raw: libc::sigset_t = mem::zeroed();
            libc::sigemptyset(&mut raw);
            for signo in set.signals() {
                libc::sigaddset(&mut raw, signo);
            }
            raw
        }
    }

    fn from_sigset(raw: &libc::sigset_t) -> SignalSet {
        let mut set = SignalSet::empty();
        for signo in 1..NSIG as i32 {
            if unsafe { libc::sigismember(raw, signo) } == 1 {
                set.add(signo);
            }
        }
        set
    }

    /// Point the OS disposition of `signo` at the trampoline (or at
    /// `SIG_DFL`/`SIG_IGN` for the non-handled actions).
    pub(crate) fn install_action(signo: i32, action: &SignalAction) -> io::Result<()> {
        let mut act: libc::sigaction = unsafe { mem::zeroed() };
        unsafe { libc::sigemptyset(&mut act.sa_mask) };
        act.sa_flags = libc::SA_ONSTACK;
        act.sa_sigaction = match action {
            SignalAction::Default => libc::SIG_DFL,
            SignalAction::Ignore => libc::SIG_IGN,
            SignalAction::Handle(_) => {
                record_trampoline as extern "C" fn(libc::c_int) as *const () as libc::sighandler_t
            }
        };
        if unsafe { libc::sigaction(signo, &act, std::ptr::null_mut()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// The calling thread's current signal mask.
    pub(crate) fn current_mask() -> SignalSet {
        unsafe {
            let mut old: libc::sigset_t = mem::zeroed();
            libc::pthread_sigmask(libc::SIG_BLOCK, std::ptr::null(), &mut old);
            from_sigset(&old)
        }
    }

    /// Update the calling thread's mask, returning the previous one.
    pub(crate) fn set_thread_mask(how: MaskHow, set: &SignalSet) -> io::Result<SignalSet> {
        let how = match how {
            MaskHow::Set => libc::SIG_SETMASK,
            MaskHow::Block => libc::SIG_BLOCK,
            MaskHow::Unblock => libc::SIG_UNBLOCK,
        };
        let raw = to_sigset(set);
        let mut old: libc::sigset_t = unsafe { mem::zeroed() };
        let rc = unsafe { libc::pthread_sigmask(how, &raw, &mut old) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(from_sigset(&old))
    }

    /// RAII guard masking one signal on the calling thread.
    pub(crate) struct BlockedSignal {
        prev: libc::sigset_t,
    }

    impl BlockedSignal {
        pub(crate) fn new(signo: i32) -> Self {
            unsafe {
                let mut block: libc::sigset_t = mem::zeroed();
                libc::sigemptyset(&mut block);
                libc::sigaddset(&mut block, signo);
                let mut prev: libc::sigset_t = mem::zeroed();
                libc::pthread_sigmask(libc::SIG_BLOCK, &block, &mut prev);
                BlockedSignal { prev }
            }
        }
    }

    impl Drop for BlockedSignal {
        fn drop(&mut self) {
            unsafe {
                libc::pthread_sigmask(libc::SIG_SETMASK, &self.prev, std::ptr::null_mut());
            }
        }
    }

    /// Block until one of `set` is delivered; returns its number.
    ///
    /// The caller must have the members of `set` masked, per POSIX.
    pub(crate) fn sigwait(set: &SignalSet) -> io::Result<i32> {
        let raw = to_sigset(set);
        let mut signo: libc::c_int = 0;
        let rc = unsafe { libc::sigwait(&raw, &mut signo) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(signo)
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub(crate) fn errno() -> i32 {
        unsafe { *libc::__errno_location() }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub(crate) fn set_errno(value: i32) {
        unsafe { *libc::__errno_location() = value }
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    pub(crate) fn errno() -> i32 {
        unsafe { *libc::__error() }
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    pub(crate) fn set_errno(value: i32) {
        unsafe { *libc::__error() = value }
    }
}

#[cfg(not(unix))]
mod fallback {
    use std::io;

    use crate::handlers::SignalAction;
    use crate::mask::{MaskHow, SignalSet};

    pub(crate) fn install_action(_signo: i32, _action: &SignalAction) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "OS signal dispositions are not supported on this platform",
        ))
    }

    pub(crate) fn current_mask() -> SignalSet {
        SignalSet::empty()
    }

    pub(crate) fn set_thread_mask(_how: MaskHow, _set: &SignalSet) -> io::Result<SignalSet> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "thread signal masks are not supported on this platform",
        ))
    }

    pub(crate) struct BlockedSignal;

    impl BlockedSignal {
        pub(crate) fn new(_signo: i32) -> Self {
            BlockedSignal
        }
    }

    pub(crate) fn sigwait(_set: &SignalSet) -> io::Result<i32> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sigwait is not supported on this platform",
        ))
    }

    pub(crate) fn errno() -> i32 {
        0
    }

    pub(crate) fn set_errno(_value: i32) {}
}
