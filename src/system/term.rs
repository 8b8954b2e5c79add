use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;

use crate::cutils::{cerr, os_string_from_ptr, safe_isatty};

use super::interface::ProcessId;

/// The path of the terminal connected to standard input, if there is one.
/// Only used for reporting (PAM_TTY); security decisions go through
/// [session_leader], which does not trust the standard descriptors.
pub fn current_tty_name() -> io::Result<OsString> {
    let fd = std::io::stdin().as_raw_fd();
    if !safe_isatty(fd) {
        return Err(io::Error::from_raw_os_error(libc::ENOTTY));
    }

    let mut buf: [libc::c_char; 1024] = [0; 1024];
    // SAFETY: we pass ttyname_r a valid buffer of the length we claim
    cerr(unsafe { libc::ttyname_r(fd, buf.as_mut_ptr(), buf.len()) })?;
    // SAFETY: ttyname_r succeeded, so buf holds a null-terminated C string
    Ok(unsafe { os_string_from_ptr(buf.as_ptr()) })
}

/// The session leader of the controlling terminal, asked of the terminal
/// itself; stdin/stdout/stderr may be redirected to any tty the invoker can
/// open, so they have no say in this.
#[cfg_attr(not(feature = "timestamp"), allow(dead_code))]
pub fn session_leader() -> io::Result<ProcessId> {
    let tty = File::open("/dev/tty")?;
    let mut leader: libc::pid_t = 0;
    // SAFETY: TIOCGSID writes one pid_t through the valid pointer we pass
    cerr(unsafe { libc::ioctl(tty.as_raw_fd(), libc::TIOCGSID, &mut leader) })?;
    Ok(ProcessId::new(leader))
}

#[cfg(test)]
mod tests {
    #[test]
    fn tty_name_of_non_tty_fails() {
        // under the test runner stdin is typically not a terminal; when it
        // is, the call must produce a device path instead
        match super::current_tty_name() {
            Ok(name) => assert!(!name.is_empty()),
            Err(err) => assert!(err.raw_os_error().is_some()),
        }
    }
}
