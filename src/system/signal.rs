#![cfg_attr(not(feature = "pam"), allow(dead_code))]

use std::io;
use std::mem::MaybeUninit;

use crate::cutils::cerr;

use super::make_zeroed_sigaction;

pub type SignalNumber = libc::c_int;

/// A set of signals, used to manipulate the signal mask of the process.
pub struct SignalSet {
    raw: libc::sigset_t,
}

impl SignalSet {
    pub fn empty() -> io::Result<Self> {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        // SAFETY: sigemptyset initializes the set we pass
        cerr(unsafe { libc::sigemptyset(set.as_mut_ptr()) })?;
        // SAFETY: initialized by the call above
        Ok(Self {
            raw: unsafe { set.assume_init() },
        })
    }

    pub fn full() -> io::Result<Self> {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        // SAFETY: sigfillset initializes the set we pass
        cerr(unsafe { libc::sigfillset(set.as_mut_ptr()) })?;
        // SAFETY: initialized by the call above
        Ok(Self {
            raw: unsafe { set.assume_init() },
        })
    }

    pub fn add(&mut self, signal: SignalNumber) -> io::Result<()> {
        // SAFETY: the set was initialized by one of the constructors
        cerr(unsafe { libc::sigaddset(&mut self.raw, signal) }).map(|_| ())
    }

    fn sigprocmask(&self, how: libc::c_int) -> io::Result<()> {
        // SAFETY: a valid initialized set is passed; the old mask is not requested
        cerr(unsafe { libc::sigprocmask(how, &self.raw, std::ptr::null_mut()) }).map(|_| ())
    }

    /// Add these signals to the blocked set of the process.
    pub fn block(&self) -> io::Result<()> {
        self.sigprocmask(libc::SIG_BLOCK)
    }

    /// Remove these signals from the blocked set of the process.
    pub fn unblock(&self) -> io::Result<()> {
        self.sigprocmask(libc::SIG_UNBLOCK)
    }
}

/// A previously installed disposition, to be given back to [set_handler].
pub struct SignalAction {
    raw: libc::sigaction,
}

/// Install `handler` for `signal` and return the old disposition.
///
/// The handler runs with every other signal blocked and must restrict
/// itself to async-signal-safe work (in this program: a single atomic store).
pub fn set_handler(
    signal: SignalNumber,
    handler: extern "C" fn(SignalNumber),
) -> io::Result<SignalAction> {
    let mut action = make_zeroed_sigaction();
    action.sa_sigaction = handler as *const () as libc::sighandler_t;
    // SAFETY: sigfillset initializes the mask field of the (valid) action
    cerr(unsafe { libc::sigfillset(&mut action.sa_mask) })?;

    let mut old_action = make_zeroed_sigaction();
    // SAFETY: both action pointers refer to initialized structs
    cerr(unsafe { libc::sigaction(signal, &action, &mut old_action) })?;

    Ok(SignalAction { raw: old_action })
}

/// Put a previously saved disposition back in place.
pub fn restore_handler(signal: SignalNumber, old: SignalAction) -> io::Result<()> {
    // SAFETY: `old.raw` came out of a successful sigaction call
    cerr(unsafe { libc::sigaction(signal, &old.raw, std::ptr::null_mut()) }).map(|_| ())
}

/// Send `signal` to the current process.
pub fn raise(signal: SignalNumber) -> io::Result<()> {
    // SAFETY: raise cannot cause memory safety issues
    cerr(unsafe { libc::raise(signal) }).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    static SEEN: AtomicI32 = AtomicI32::new(0);

    extern "C" fn latch(signal: SignalNumber) {
        SEEN.store(signal, Ordering::SeqCst);
    }

    #[test]
    fn handler_can_be_installed_and_restored() {
        let old = set_handler(libc::SIGUSR1, latch).unwrap();
        raise(libc::SIGUSR1).unwrap();
        assert_eq!(SEEN.load(Ordering::SeqCst), libc::SIGUSR1);

        // block the signal, then make sure restoring does not blow up
        let mut set = SignalSet::empty().unwrap();
        set.add(libc::SIGUSR1).unwrap();
        set.block().unwrap();
        restore_handler(libc::SIGUSR1, old).unwrap();
        set.unblock().unwrap();
    }
}
