#![cfg_attr(not(any(feature = "pam", feature = "shadow")), allow(dead_code))]
//! Reading a password from the controlling terminal with echo disabled.
//!
//! Only `/dev/tty` is used for this; the standard descriptors are under the
//! invoker's control and redirecting them must not fool the prompt.

use std::fs;
use std::io::{self, Read};
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use libc::{tcsetattr, termios, ECHO, ECHONL, TCSANOW, VEOF, VERASE, VKILL};

use crate::cutils::{cerr, safe_isatty};

use super::securemem::PasswordBuffer;

struct HiddenInput<'a> {
    tty: BorrowedFd<'a>,
    term_orig: termios,
}

impl HiddenInput<'_> {
    fn new(tty: BorrowedFd) -> io::Result<HiddenInput> {
        // Make two copies of the terminal settings. The first one will be modified
        // and the second one will act as a backup for when we want to set the
        // terminal back to its original state.
        let mut term = safe_tcgetattr(tty)?;
        let term_orig = safe_tcgetattr(tty)?;

        // Hide the password. This is what makes this function useful.
        term.c_lflag &= !ECHO;

        // But don't hide the NL character when the user hits ENTER.
        term.c_lflag |= ECHONL;

        // SAFETY: we are passing tcsetattr a valid file descriptor and pointer-to-struct
        cerr(unsafe { tcsetattr(tty.as_raw_fd(), TCSANOW, &term) })?;

        Ok(HiddenInput { tty, term_orig })
    }
}

impl Drop for HiddenInput<'_> {
    fn drop(&mut self) {
        // Set the mode back to normal
        // SAFETY: we are passing tcsetattr a valid file descriptor and pointer-to-struct
        unsafe {
            tcsetattr(self.tty.as_raw_fd(), TCSANOW, &self.term_orig);
        }
    }
}

fn safe_tcgetattr(tty: impl AsFd) -> io::Result<termios> {
    let mut term = mem::MaybeUninit::<termios>::uninit();
    // SAFETY: we are passing tcgetattr a pointer to valid memory
    cerr(unsafe { libc::tcgetattr(tty.as_fd().as_raw_fd(), term.as_mut_ptr()) })?;
    // SAFETY: if the previous call was a success, `tcgetattr` has initialized `term`
    Ok(unsafe { term.assume_init() })
}

/// Reads input from the given stream up to the next newline, into a buffer
/// that will not be swapped out and is wiped on drop. When a terminal state
/// is given, the line-editing control characters of that terminal apply.
fn read_unbuffered(
    source: &mut dyn io::Read,
    hide_input: Option<&HiddenInput>,
) -> io::Result<PasswordBuffer> {
    let mut password = PasswordBuffer::default();
    let mut pw_len = 0;

    let mut buf = [0u8; 1];
    loop {
        if source.read(&mut buf)? == 0 {
            break;
        }
        let read_byte = buf[0];

        if read_byte == b'\n' || read_byte == b'\r' {
            return Ok(password);
        }

        if let Some(input) = hide_input {
            if read_byte == input.term_orig.c_cc[VEOF] {
                break;
            }

            if read_byte == input.term_orig.c_cc[VERASE] {
                if pw_len > 0 {
                    password[pw_len - 1] = 0;
                    pw_len -= 1;
                }
                continue;
            }

            if read_byte == input.term_orig.c_cc[VKILL] {
                password.fill(0);
                pw_len = 0;
                continue;
            }
        }

        if let Some(dest) = password.get_mut(pw_len) {
            *dest = read_byte;
            pw_len += 1;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "provided response was too long",
            ));
        }
    }

    if pw_len == 0 {
        // In case of EOF or Ctrl-D we don't want to ask for a password a second
        // time, so return an error.
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no password was provided",
        ))
    } else {
        Ok(password)
    }
}

/// Write something and immediately flush
fn write_unbuffered(sink: &mut dyn io::Write, text: &[u8]) -> io::Result<()> {
    sink.write_all(text)?;
    sink.flush()
}

/// The controlling terminal, opened for a conversation with the user.
pub struct Terminal {
    tty: fs::File,
}

impl Terminal {
    /// Open the current TTY for user communication; a process without one
    /// cannot ask for a password at all.
    pub fn open_tty() -> io::Result<Self> {
        let tty = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .map_err(|_| io::Error::from_raw_os_error(libc::ENOTTY))?;

        // control ourselves that we are really talking to a TTY
        if !safe_isatty(tty.as_fd().as_raw_fd()) {
            return Err(io::Error::from_raw_os_error(libc::ENOTTY));
        }

        Ok(Terminal { tty })
    }

    /// Display a prompt and read one line of input, with echo suppressed
    /// if `hide` is set.
    pub fn read_input(&mut self, prompt: &str, hide: bool) -> io::Result<PasswordBuffer> {
        write_unbuffered(&mut self.tty, prompt.as_bytes())?;

        let hidden = if hide {
            Some(HiddenInput::new(self.tty.as_fd())?)
        } else {
            None
        };
        let mut source = &self.tty;
        read_unbuffered(&mut source, hidden.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::read_unbuffered;

    #[test]
    fn reading_stops_at_the_newline() {
        let mut data = "password123\nhello world".as_bytes();
        let buf = read_unbuffered(&mut data, None).unwrap();
        // check that the \n is not part of the input
        assert_eq!(
            buf.iter()
                .map(|&b| b as char)
                .take_while(|&x| x != '\0')
                .collect::<String>(),
            "password123"
        );
        // check that the \n is also consumed but the rest of the input is still there
        assert_eq!(std::str::from_utf8(data).unwrap(), "hello world");
    }

    #[test]
    fn overlong_passwords_are_rejected() {
        assert!(read_unbuffered(&mut "a".repeat(511).as_bytes(), None).is_ok());
        assert!(read_unbuffered(&mut "a".repeat(512).as_bytes(), None).is_err());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(read_unbuffered(&mut "".as_bytes(), None).is_err());
    }
}
