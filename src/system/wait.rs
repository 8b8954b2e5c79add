#![cfg_attr(not(feature = "pam"), allow(dead_code))]

use std::io;

use libc::{c_int, WEXITSTATUS, WIFEXITED, WIFSIGNALED, WTERMSIG};

use crate::cutils::cerr;
use crate::system::interface::ProcessId;
use crate::system::signal::SignalNumber;

/// Wait for a child process to terminate.
///
/// Calling this function will block until the child specified by `pid` has
/// exited or was killed by a signal.
pub fn waitpid(pid: ProcessId, options: WaitOptions) -> io::Result<(ProcessId, WaitStatus)> {
    let mut status: c_int = 0;

    // SAFETY: a valid pointer is passed for the status out-parameter
    let pid = cerr(unsafe { libc::waitpid(pid.inner(), &mut status, options.flags) })?;

    Ok((ProcessId::new(pid), WaitStatus { status }))
}

/// Options to configure how [`waitpid`] waits for children.
pub struct WaitOptions {
    flags: c_int,
}

impl WaitOptions {
    /// Only wait for terminated children.
    pub const fn new() -> Self {
        Self { flags: 0 }
    }
}

/// The status of the waited child.
#[derive(Clone, Copy)]
pub struct WaitStatus {
    status: c_int,
}

impl WaitStatus {
    /// Return `true` if the child terminated normally, i.e., by calling `exit`.
    pub const fn did_exit(&self) -> bool {
        WIFEXITED(self.status)
    }

    /// Return the exit status of the child if the child terminated normally.
    pub const fn exit_status(&self) -> Option<c_int> {
        if self.did_exit() {
            Some(WEXITSTATUS(self.status))
        } else {
            None
        }
    }

    /// Return `true` if the child process was terminated by a signal.
    pub const fn was_signaled(&self) -> bool {
        WIFSIGNALED(self.status)
    }

    /// Return the signal number which caused the child to terminate if the child was terminated by
    /// a signal.
    pub const fn term_signal(&self) -> Option<SignalNumber> {
        if self.was_signaled() {
            Some(WTERMSIG(self.status))
        } else {
            None
        }
    }
}
