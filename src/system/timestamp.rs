//! Per-session authentication tokens.
//!
//! A token must not be reusable from another terminal, must survive neither
//! the session leader nor a clock rollback, and must never be reachable
//! through a symlink. Hence:
//!
//! - the token name is bound to the session leader (pid, start time) and the
//!   controlling tty as recorded in the leader's process-stat record; the
//!   user-controllable standard descriptors are never consulted,
//! - the content holds expiry points from two clocks, and both have to agree
//!   for the token to count,
//! - every file operation goes through a held directory descriptor using
//!   `openat`/`unlinkat` with `O_NOFOLLOW`.

use std::ffi::{CString, OsString};
use std::fs::File;
use std::io::{self, Read, Seek};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::fs::MetadataExt;
use std::time::Duration;

use crate::cutils::cerr;

use super::term;
use super::time::{Timestamp, TIMESTAMP_SIZE};
use super::{Process, User, WithProcess};

const TIMESTAMP_DIR: &str = "/run/doas";

/// How long a token stays valid after a successful authentication.
pub const LIFETIME: Duration = Duration::from_secs(5 * 60);

const TOKEN_SIZE: u64 = 2 * TIMESTAMP_SIZE as u64;

fn integrity_error<T>(msg: &str) -> io::Result<T> {
    Err(io::Error::new(io::ErrorKind::InvalidData, msg.to_string()))
}

/// The name of this session's token, split into the part identifying the
/// session (tty number, session leader, leader start time) and the full
/// per-invocation name. `clear` removes everything sharing the prefix.
struct TokenName {
    prefix: String,
    full: String,
}

fn token_name() -> io::Result<TokenName> {
    let leader = term::session_leader()?;
    let tty_nr = Process::tty_number(WithProcess::Other(leader))?;
    let start_time = Process::starting_time_ticks(WithProcess::Other(leader))?;
    let ppid = Process::parent_id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "process has no parent"))?;
    let sid = Process::session_id();
    if !sid.is_valid() {
        return Err(io::Error::new(io::ErrorKind::Other, "process has no session"));
    }
    let uid = User::real_uid();

    let prefix = format!(".{tty_nr}_{leader}_{start_time}");
    let full = format!("{prefix}_{ppid}_{sid}_{uid}");
    Ok(TokenName { prefix, full })
}

fn check_dir(dirfd: BorrowedFd) -> io::Result<()> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    // SAFETY: we pass fstat a valid descriptor and a valid out-pointer
    cerr(unsafe { libc::fstat(dirfd.as_raw_fd(), stat.as_mut_ptr()) })?;
    // SAFETY: fstat succeeded, so the buffer was initialized
    let stat = unsafe { stat.assume_init() };

    if stat.st_mode & libc::S_IFMT != libc::S_IFDIR {
        return integrity_error("timestamp directory is not a directory");
    }
    if stat.st_mode & 0o077 != 0 {
        return integrity_error("timestamp directory permissions are wrong");
    }
    if stat.st_uid != 0 || stat.st_gid != 0 {
        return integrity_error("timestamp directory is not owned by root");
    }

    Ok(())
}

/// Open (creating it if needed) and vet the token directory. The returned
/// descriptor anchors all further operations on token files.
fn open_dir() -> io::Result<OwnedFd> {
    let path = CString::new(TIMESTAMP_DIR).unwrap();

    loop {
        // SAFETY: the path is a valid C string; O_NOFOLLOW keeps symlinks out
        match cerr(unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDONLY | libc::O_DIRECTORY | libc::O_NOFOLLOW,
            )
        }) {
            Ok(fd) => {
                // SAFETY: open just handed us this descriptor
                let dirfd = unsafe { OwnedFd::from_raw_fd(fd) };
                check_dir(dirfd.as_fd())?;
                return Ok(dirfd);
            }
            Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {
                // SAFETY: mkdir with a valid path; racing creators are fine,
                // the loop re-opens and vets whatever won
                match cerr(unsafe { libc::mkdir(path.as_ptr(), 0o700) }) {
                    Ok(_) => continue,
                    Err(err) if err.raw_os_error() == Some(libc::EEXIST) => continue,
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn open_token_at(dirfd: BorrowedFd, name: &str) -> io::Result<File> {
    let c_name = CString::new(name).expect("token names never contain null bytes");

    // SAFETY: openat gets a vetted directory fd and a valid C string
    let fd = match cerr(unsafe {
        libc::openat(
            dirfd.as_raw_fd(),
            c_name.as_ptr(),
            libc::O_RDWR | libc::O_NOFOLLOW,
        )
    }) {
        Ok(fd) => fd,
        Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {
            // create an empty token; size 0 marks "present but never written"
            // SAFETY: as above, with O_EXCL so we never adopt a racing file
            cerr(unsafe {
                libc::openat(
                    dirfd.as_raw_fd(),
                    c_name.as_ptr(),
                    libc::O_RDWR | libc::O_CREAT | libc::O_EXCL | libc::O_NOFOLLOW,
                    libc::S_IRUSR | libc::S_IWUSR,
                )
            })?
        }
        Err(err) => return Err(err),
    };

    // SAFETY: the descriptor was just returned to us by openat
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Vet an opened token's metadata and return its size.
fn check_token(file: &File) -> io::Result<u64> {
    let meta = file.metadata()?;

    if !meta.is_file() {
        return integrity_error("timestamp is not a regular file");
    }
    if meta.mode() & 0o077 != 0 {
        return integrity_error("timestamp has wrong permissions");
    }
    if meta.uid() != 0 || meta.gid() != User::effective_gid().inner() {
        return integrity_error("timestamp has wrong owner");
    }

    Ok(meta.len())
}

/// The decision at the core of token validity, separated from the I/O so the
/// clock attacks can be tested: a token counts only when *both* clocks are
/// before their stored expiry points, and neither expiry point lies further
/// than one lifetime ahead (that is an attack or a corrupted file, and fatal).
fn check_expiry(
    stored: (Timestamp, Timestamp),
    now: (Timestamp, Timestamp),
    lifetime: Duration,
) -> io::Result<bool> {
    let (stored_mono, stored_real) = stored;
    let (now_mono, now_real) = now;

    if stored_mono.is_zero() || stored_real.is_zero() {
        return integrity_error("corrupt timestamp file");
    }

    if now_mono > stored_mono || now_real > stored_real {
        return Ok(false);
    }

    if stored_mono > now_mono + lifetime || stored_real > now_real + lifetime {
        return integrity_error("timestamp is too far in the future");
    }

    Ok(true)
}

/// Open this session's token, creating it if absent. Returns the open file
/// and whether it proves a recent authentication.
pub fn open(lifetime: Duration) -> io::Result<(File, bool)> {
    let name = token_name()?;
    let dirfd = open_dir()?;
    let mut file = open_token_at(dirfd.as_fd(), &name.full)?;

    let size = check_token(&file)?;
    let valid = match size {
        0 => false,
        TOKEN_SIZE => {
            let mut buf = [0u8; TOKEN_SIZE as usize];
            file.read_exact(&mut buf)?;
            let mut cursor = &buf[..];
            let stored_mono = Timestamp::decode(&mut cursor)?;
            let stored_real = Timestamp::decode(&mut cursor)?;
            check_expiry(
                (stored_mono, stored_real),
                (Timestamp::now_monotonic()?, Timestamp::now_realtime()?),
                lifetime,
            )?
        }
        _ => return integrity_error("corrupt timestamp file"),
    };

    Ok((file, valid))
}

/// Stamp the token: both clocks, each advanced by the lifetime.
pub fn set(file: &mut File, lifetime: Duration) -> io::Result<()> {
    let expiry_mono = Timestamp::now_monotonic()? + lifetime;
    let expiry_real = Timestamp::now_realtime()? + lifetime;

    file.rewind()?;
    file.set_len(0)?;
    expiry_mono.encode(file)?;
    expiry_real.encode(file)?;

    Ok(())
}

fn dir_entries(dirfd: BorrowedFd) -> io::Result<Vec<OsString>> {
    use std::os::unix::ffi::OsStringExt;

    // fdopendir takes ownership of the descriptor, so hand it a duplicate
    // SAFETY: dup of a valid descriptor
    let dup_fd = cerr(unsafe { libc::dup(dirfd.as_raw_fd()) })?;
    // SAFETY: dup_fd is a valid directory descriptor owned by us
    let dirp = unsafe { libc::fdopendir(dup_fd) };
    if dirp.is_null() {
        let err = io::Error::last_os_error();
        // SAFETY: close of a descriptor that fdopendir did not adopt
        unsafe { libc::close(dup_fd) };
        return Err(err);
    }

    let mut names = Vec::new();
    loop {
        crate::cutils::set_errno(0);
        // SAFETY: dirp is a valid directory stream
        let entry = unsafe { libc::readdir(dirp) };
        if entry.is_null() {
            let err = io::Error::last_os_error();
            // SAFETY: closedir of the stream we opened; also closes dup_fd
            unsafe { libc::closedir(dirp) };
            return if err.raw_os_error().unwrap_or(0) != 0 {
                Err(err)
            } else {
                Ok(names)
            };
        }
        // SAFETY: readdir returned a valid entry whose d_name is a C string
        let name = unsafe { std::ffi::CStr::from_ptr((*entry).d_name.as_ptr()) };
        let bytes = name.to_bytes();
        if bytes != b"." && bytes != b".." {
            names.push(OsString::from_vec(bytes.to_vec()));
        }
    }
}

/// Remove every token belonging to the current session, so that after `-L`
/// a new invocation from any process in this session has to authenticate.
pub fn clear() -> io::Result<()> {
    let name = token_name()?;
    let dirfd = open_dir()?;

    for entry in dir_entries(dirfd.as_fd())? {
        let Some(entry) = entry.to_str() else {
            continue;
        };
        if !entry.starts_with(&name.prefix) {
            continue;
        }
        let c_name = CString::new(entry).expect("directory entries never contain null bytes");
        // SAFETY: unlinkat on the held directory fd with a valid name
        match cerr(unsafe { libc::unlinkat(dirfd.as_raw_fd(), c_name.as_ptr(), 0) }) {
            Ok(_) => {}
            Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {}
            Err(err) => return Err(err),
        }
    }

    Ok(())
}
