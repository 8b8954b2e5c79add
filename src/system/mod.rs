use std::str::FromStr;
use std::{
    ffi::{c_char, c_int, c_long, c_uint, CStr},
    fmt, fs, io,
    mem::MaybeUninit,
    ops,
    os::unix,
    path::PathBuf,
};

use crate::common::{Error, IdentString};
use crate::cutils::*;
use interface::{GroupId, ProcessId, UserId};
use libc::{EINVAL, ENOSYS, STDERR_FILENO};

pub(crate) mod audit;
// generalized traits for when we want to hide implementations
pub mod interface;

pub mod signal;

pub mod term;

pub mod time;

#[cfg(feature = "timestamp")]
pub mod timestamp;

pub mod wait;

#[cfg(not(target_os = "linux"))]
compile_error!("doas-rs only works on Linux");

/// Mark every file descriptor that is not one of the IO streams as CLOEXEC,
/// so nothing above stderr survives into the target program.
pub(crate) fn mark_fds_as_cloexec() -> io::Result<()> {
    let lowfd = STDERR_FILENO + 1;

    // close_range was only added in glibc 2.34, and is not part of musl,
    // so we go perform a straight syscall instead
    // SAFETY: this function is safe to call:
    // - any errors while closing a specific fd will be effectively ignored
    let res = cerr(unsafe {
        libc::syscall(
            libc::SYS_close_range,
            lowfd as c_uint,
            c_uint::MAX,
            libc::CLOSE_RANGE_CLOEXEC as c_uint,
        )
    });

    match res {
        Err(err) if err.raw_os_error() == Some(ENOSYS) || err.raw_os_error() == Some(EINVAL) => {
            // The kernel doesn't support close_range or CLOSE_RANGE_CLOEXEC,
            // fallback to finding all open fds using /proc/self/fd.
            for entry in fs::read_dir("/proc/self/fd")? {
                let entry = entry?;
                let file_name = entry.file_name();
                let file_name = file_name.to_str().ok_or(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "procfs returned non-integer fd name",
                ))?;
                let fd = file_name.parse::<c_int>().map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        "procfs returned non-integer fd name",
                    )
                })?;
                if fd < lowfd {
                    continue;
                }
                // SAFETY: This only sets the CLOEXEC flag for the given fd. Nothing is
                // going to need it after exec.
                unsafe {
                    cerr(libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
                }
            }

            Ok(())
        }
        Err(err) => Err(err),
        Ok(_) => Ok(()),
    }
}

#[cfg(feature = "pam")]
pub(crate) enum ForkResult {
    // Parent process branch with the child process' PID.
    Parent(ProcessId),
    // Child process branch.
    Child,
}

/// Create a new process.
///
/// # Safety
///
/// Must not be called in multithreaded programs.
#[cfg(feature = "pam")]
pub(crate) unsafe fn fork() -> io::Result<ForkResult> {
    // SAFETY: Calling async-signal-unsafe functions after fork is safe as the program is single
    // threaded at this point according to the safety invariant of this function.
    let pid = cerr(unsafe { libc::fork() })?;
    if pid == 0 {
        Ok(ForkResult::Child)
    } else {
        Ok(ForkResult::Parent(ProcessId::new(pid)))
    }
}

#[derive(Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Hostname {
    inner: String,
}

impl fmt::Debug for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hostname").field(&self.inner).finish()
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl ops::Deref for Hostname {
    type Target = str;

    fn deref(&self) -> &str {
        &self.inner
    }
}

impl Hostname {
    pub fn resolve() -> Self {
        // see `man 2 gethostname`
        const MAX_HOST_NAME_SIZE_ACCORDING_TO_SUSV2: c_long = 255;

        let max_hostname_size = sysconf(libc::_SC_HOST_NAME_MAX)
            .unwrap_or(MAX_HOST_NAME_SIZE_ACCORDING_TO_SUSV2)
            as usize;

        let buffer_size = max_hostname_size + 1 /* null byte delimiter */ ;
        let mut buf = vec![0; buffer_size];

        // SAFETY: we are passing a valid pointer to gethostname
        match cerr(unsafe { libc::gethostname(buf.as_mut_ptr(), buffer_size) }) {
            // SAFETY: gethostname succeeded, so `buf` will hold a null-terminated C string
            Ok(_) => Self {
                inner: unsafe { string_from_ptr(buf.as_ptr()) },
            },

            // fall back to a placeholder; the hostname is only used in the password prompt
            Err(_) => Self { inner: "?".into() },
        }
    }
}

pub fn syslog(priority: c_int, facility: c_int, message: &CStr) {
    const MSG: *const c_char = match CStr::from_bytes_until_nul(b"%s\0") {
        Ok(cstr) => cstr.as_ptr(),
        Err(_) => panic!("syslog formatting string is not null-terminated"),
    };

    // SAFETY:
    // - "MSG" is a constant expression that is a null-terminated C string that represents "%s";
    //   this also means that to achieve safety we MUST pass one more argument to syslog that is a proper
    //   pointer to a null-terminated C string
    // - message.as_ptr() is a pointer to a proper null-terminated C string (message being a &CStr)
    // for more info: read the manpage for syslog(2)
    unsafe {
        libc::syslog(priority | facility, MSG, message.as_ptr());
    }
}

/// The supplementary groups of the calling process, as the kernel knows them.
pub fn process_groups() -> io::Result<Vec<GroupId>> {
    // SAFETY: calling getgroups with a null pointer and size 0 only queries the count
    let ngroups = cerr(unsafe { libc::getgroups(0, std::ptr::null_mut()) })?;

    let mut groups: Vec<libc::gid_t> = vec![0; ngroups as usize];
    // SAFETY: the buffer is as large as getgroups told us it needs to be
    let written = cerr(unsafe { libc::getgroups(ngroups, groups.as_mut_ptr()) })?;
    groups.truncate(written as usize);

    Ok(groups.into_iter().map(GroupId::new).collect())
}

/// Transition to the target identity: gid first, then the target's
/// supplementary groups, then the uid, using the three-id forms so real,
/// effective and saved ids all end up equal. Finally reset the umask.
pub fn become_user(user: &User, group: &Group) -> io::Result<()> {
    let gid = group.gid.inner();
    // SAFETY: setresgid is always safe to call
    cerr(unsafe { libc::setresgid(gid, gid, gid) })?;
    // SAFETY: the name is a valid C string owned by `user`
    cerr(unsafe { libc::initgroups(user.name.as_cstr().as_ptr(), gid) })?;
    let uid = user.uid.inner();
    // SAFETY: setresuid is always safe to call
    cerr(unsafe { libc::setresuid(uid, uid, uid) })?;
    // SAFETY: umask is always safe to call
    unsafe { libc::umask(0o022) };

    Ok(())
}

/// Give up the setuid privilege for good by setting the real, effective and
/// saved uid to the real uid (used by the config-check mode, which must not
/// parse arbitrary files with elevated privilege).
pub fn drop_privileges() -> io::Result<()> {
    let uid = User::real_uid().inner();
    // SAFETY: setresuid is always safe to call
    cerr(unsafe { libc::setresuid(uid, uid, uid) })?;
    Ok(())
}

/// Send a signal to a process with the specified ID.
#[cfg_attr(not(feature = "pam"), allow(dead_code))]
pub fn kill(pid: ProcessId, signal: signal::SignalNumber) -> io::Result<()> {
    // SAFETY: This function cannot cause UB even if `pid` is not a valid process ID or if
    // `signal` is not a valid signal code.
    cerr(unsafe { libc::kill(pid.inner(), signal) }).map(|_| ())
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub uid: UserId,
    pub gid: GroupId,
    pub name: IdentString,
    pub home: PathBuf,
    pub shell: std::ffi::OsString,
    pub groups: Vec<GroupId>,
}

impl User {
    /// # Safety
    /// This function expects `pwd` to be a result from a successful call to `getpwXXX_r`.
    /// (It can cause UB if any of `pwd`'s pointed-to strings does not have a null-terminator.)
    unsafe fn from_libc(pwd: &libc::passwd) -> Result<User, Error> {
        let mut buf_len: c_int = 32;
        let mut groups_buffer: Vec<libc::gid_t>;

        while {
            groups_buffer = vec![0; buf_len as usize];
            // SAFETY: getgrouplist is passed valid pointers
            // in particular `groups_buffer` is an array of `buf_len` gids, as required
            let result = unsafe {
                libc::getgrouplist(
                    pwd.pw_name,
                    pwd.pw_gid,
                    groups_buffer.as_mut_ptr(),
                    &mut buf_len,
                )
            };

            result == -1
        } {
            if buf_len >= 65536 {
                panic!("user has too many groups (> 65536), this should not happen");
            }

            buf_len *= 2;
        }

        groups_buffer.truncate(buf_len as usize);

        // SAFETY: All pointers were initialized by a successful call to `getpwXXX_r` as per the
        // safety invariant of this function.
        unsafe {
            Ok(User {
                uid: UserId::new(pwd.pw_uid),
                gid: GroupId::new(pwd.pw_gid),
                name: IdentString::new(string_from_ptr(pwd.pw_name))?,
                home: os_string_from_ptr(pwd.pw_dir).into(),
                shell: os_string_from_ptr(pwd.pw_shell),
                groups: groups_buffer.into_iter().map(GroupId::new).collect(),
            })
        }
    }

    pub fn from_uid(uid: UserId) -> Result<Option<User>, Error> {
        let max_pw_size = sysconf(libc::_SC_GETPW_R_SIZE_MAX).unwrap_or(16_384);
        let mut buf = vec![0; max_pw_size as usize];
        let mut pwd = MaybeUninit::uninit();
        let mut pwd_ptr = std::ptr::null_mut();
        // SAFETY: getpwuid_r is passed valid (although partly uninitialized) pointers to memory,
        // in particular `buf` points to an array of `buf.len()` bytes, as required.
        // After this call, if `pwd_ptr` is not NULL, `*pwd_ptr` and `pwd` will be aliased;
        // but we never dereference `pwd_ptr`.
        cerr(unsafe {
            libc::getpwuid_r(
                uid.inner(),
                pwd.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut pwd_ptr,
            )
        })?;
        if pwd_ptr.is_null() {
            Ok(None)
        } else {
            // SAFETY: pwd_ptr was not null, and getpwuid_r succeeded, so we have assurances that
            // the `pwd` structure was written to by getpwuid_r
            let pwd = unsafe { pwd.assume_init() };
            // SAFETY: `pwd` was obtained by a call to getpwXXX_r, as required.
            unsafe { Self::from_libc(&pwd).map(Some) }
        }
    }

    pub fn from_name(name_c: &CStr) -> Result<Option<User>, Error> {
        let max_pw_size = sysconf(libc::_SC_GETPW_R_SIZE_MAX).unwrap_or(16_384);
        let mut buf = vec![0; max_pw_size as usize];
        let mut pwd = MaybeUninit::uninit();
        let mut pwd_ptr = std::ptr::null_mut();

        // SAFETY: analogous to getpwuid_r above
        cerr(unsafe {
            libc::getpwnam_r(
                name_c.as_ptr(),
                pwd.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut pwd_ptr,
            )
        })?;
        if pwd_ptr.is_null() {
            Ok(None)
        } else {
            // SAFETY: pwd_ptr was not null, and getpwnam_r succeeded, so we have assurances that
            // the `pwd` structure was written to by getpwnam_r
            let pwd = unsafe { pwd.assume_init() };
            // SAFETY: `pwd` was obtained by a call to getpwXXX_r, as required.
            unsafe { Self::from_libc(&pwd).map(Some) }
        }
    }

    pub fn effective_uid() -> UserId {
        // SAFETY: this function cannot cause memory safety issues
        UserId::new(unsafe { libc::geteuid() })
    }

    pub fn effective_gid() -> GroupId {
        // SAFETY: this function cannot cause memory safety issues
        GroupId::new(unsafe { libc::getegid() })
    }

    pub fn real_uid() -> UserId {
        // SAFETY: this function cannot cause memory safety issues
        UserId::new(unsafe { libc::getuid() })
    }

    pub fn real_gid() -> GroupId {
        // SAFETY: this function cannot cause memory safety issues
        GroupId::new(unsafe { libc::getgid() })
    }

    pub fn real() -> Result<Option<User>, Error> {
        Self::from_uid(Self::real_uid())
    }

    pub fn primary_group(&self) -> io::Result<Group> {
        Group::from_gid(self.gid)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no group entry for gid {}", self.gid),
            )
        })
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Group {
    pub gid: GroupId,
    pub name: Option<String>,
}

impl Group {
    /// # Safety
    /// This function expects `grp` to be a result from a successful call to `getgrXXX_r`.
    unsafe fn from_libc(grp: &libc::group) -> Group {
        // SAFETY: The name pointer is initialized by a successful call to `getgrXXX_r` as per the
        // safety invariant of this function.
        let name = unsafe { string_from_ptr(grp.gr_name) };
        Group {
            gid: GroupId::new(grp.gr_gid),
            name: Some(name),
        }
    }

    pub fn from_gid(gid: GroupId) -> io::Result<Option<Group>> {
        let max_gr_size = sysconf(libc::_SC_GETGR_R_SIZE_MAX).unwrap_or(16_384);
        let mut buf = vec![0; max_gr_size as usize];
        let mut grp = MaybeUninit::uninit();
        let mut grp_ptr = std::ptr::null_mut();
        // SAFETY: analogous to getpwuid_r above
        cerr(unsafe {
            libc::getgrgid_r(
                gid.inner(),
                grp.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut grp_ptr,
            )
        })?;
        if grp_ptr.is_null() {
            Ok(None)
        } else {
            // SAFETY: grp_ptr was not null, and getgrgid_r succeeded, so we have assurances that
            // the `grp` structure was written to by getgrgid_r
            let grp = unsafe { grp.assume_init() };
            // SAFETY: `grp` was obtained by a call to getgrXXX_r, as required.
            Ok(Some(unsafe { Group::from_libc(&grp) }))
        }
    }

    pub fn from_name(name_c: &CStr) -> io::Result<Option<Group>> {
        let max_gr_size = sysconf(libc::_SC_GETGR_R_SIZE_MAX).unwrap_or(16_384);
        let mut buf = vec![0; max_gr_size as usize];
        let mut grp = MaybeUninit::uninit();
        let mut grp_ptr = std::ptr::null_mut();
        // SAFETY: analogous to getpwuid_r above
        cerr(unsafe {
            libc::getgrnam_r(
                name_c.as_ptr(),
                grp.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut grp_ptr,
            )
        })?;
        if grp_ptr.is_null() {
            Ok(None)
        } else {
            // SAFETY: grp_ptr was not null, and getgrnam_r succeeded, so we have assurances that
            // the `grp` structure was written to by getgrnam_r
            let grp = unsafe { grp.assume_init() };
            // SAFETY: `grp` was obtained by a call to getgrXXX_r, as required.
            Ok(Some(unsafe { Group::from_libc(&grp) }))
        }
    }
}

#[cfg_attr(not(feature = "timestamp"), allow(dead_code))]
pub enum WithProcess {
    Current,
    Other(ProcessId),
}

impl WithProcess {
    fn to_proc_string(&self) -> String {
        match self {
            WithProcess::Current => "self".into(),
            WithProcess::Other(pid) => pid.to_string(),
        }
    }
}

/// Queries about processes, answered from the kernel rather than from
/// anything the invoker can influence.
pub struct Process;

#[cfg_attr(not(feature = "timestamp"), allow(dead_code))]
impl Process {
    /// Return the parent process identifier for the current process
    pub fn parent_id() -> Option<ProcessId> {
        // NOTE libstd casts the `i32` that `libc::getppid` returns into `u32`
        // here we cast it back into `i32` (`ProcessId`)
        let pid = ProcessId::new(unix::process::parent_id() as i32);
        if !pid.is_valid() {
            None
        } else {
            Some(pid)
        }
    }

    /// Get the session id for the current process
    pub fn session_id() -> ProcessId {
        // SAFETY: this function is explicitly safe to call with argument 0,
        // and more generally getsid will never cause memory safety issues.
        ProcessId::new(unsafe { libc::getsid(0) })
    }

    /// The controlling terminal number of the given process, as recorded in
    /// its process-stat record. This deliberately does not consult the
    /// standard descriptors, which are under the invoker's control.
    pub fn tty_number(pid: WithProcess) -> io::Result<i32> {
        read_proc_stat(pid, 6 /* tty_nr */)
    }

    /// The start time of the given process in clock ticks since boot; used
    /// to detect pid reuse after the session leader exits.
    pub fn starting_time_ticks(pid: WithProcess) -> io::Result<u64> {
        read_proc_stat(pid, 21 /* start_time */)
    }
}

/// Read the n-th field (with 0-based indexing) from `/proc/<pid>/stat`.
///
/// See ["Table 1-4: Contents of the stat fields" of "The /proc
/// Filesystem"][proc_stat_fields] in the Linux docs for all available fields.
///
/// IMPORTANT: the first two fields are not accessible with this routine.
///
/// [proc_stat_fields]: https://www.kernel.org/doc/html/latest/filesystems/proc.html#id10
#[cfg_attr(not(feature = "timestamp"), allow(dead_code))]
fn read_proc_stat<T: FromStr>(pid: WithProcess, field_idx: isize) -> io::Result<T> {
    // the first two fields are skipped by the code below, and we never need them,
    // so no point in implementing code for it in this private function.
    debug_assert!(field_idx >= 2);

    // read from a specific pid file, or use `self` to refer to our own process
    let pidref = pid.to_proc_string();

    // read the data from the stat file for the process with the given pid
    let path = PathBuf::from_iter(&["/proc", &pidref, "stat"]);
    let proc_stat = std::fs::read(path)?;

    // first get the part of the stat file past the second argument, we then reverse
    // search for a ')' character and start the search for the remaining fields from
    // there on; the second field 'comm' can contain spaces and parentheses itself
    let skip_past_second_arg = proc_stat.iter().rposition(|b| *b == b')').ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "Could not find position of 'comm' field in process stat",
        )
    })?;
    let mut stat = &proc_stat[skip_past_second_arg..];

    // we've now passed the first two fields, so we are at index 1, now we skip over
    // fields until we arrive at the field we are searching for
    let mut curr_field = 1;
    while curr_field < field_idx && !stat.is_empty() {
        if stat[0] == b' ' {
            curr_field += 1;
        }
        stat = &stat[1..];
    }

    // The expected field cannot be in the file anymore when we are at EOF
    if stat.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Stat file was not of the expected format",
        ));
    }

    // we've now arrived at the field we are looking for, we now check how
    // long this field is by finding where the next space is
    let mut idx = 0;
    while idx < stat.len() && stat[idx] != b' ' {
        idx += 1;
    }
    let field = &stat[0..idx];

    // we first convert the data to a string slice, this should not fail with a normal /proc filesystem
    let fielddata = std::str::from_utf8(field).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "Could not interpret byte slice as string",
        )
    })?;

    // then we convert the string slice to whatever the requested type was
    fielddata.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "Could not interpret string as number",
        )
    })
}

pub fn make_zeroed_sigaction() -> libc::sigaction {
    // SAFETY: since sigaction is a C struct, all-zeroes is a valid representation
    // We cannot use a "literal struct" initialization method since the exact representation
    // of libc::sigaction is not fixed
    unsafe { std::mem::zeroed() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_user_and_group_by_id() {
        let root = User::from_uid(UserId::ROOT).unwrap().unwrap();
        assert_eq!(root.uid, UserId::ROOT);
        assert_eq!(&*root.name, "root");

        let root_group = Group::from_gid(GroupId::new(0)).unwrap().unwrap();
        assert_eq!(root_group.gid, GroupId::new(0));
        assert_eq!(root_group.name.as_deref(), Some("root"));
    }

    #[test]
    fn test_process_groups() {
        let groups = process_groups().unwrap();
        // every process has a group set; it may legitimately be empty, but
        // the call itself must succeed and agree with a second reading
        assert_eq!(groups, process_groups().unwrap());
    }

    #[test]
    fn proc_stat_test() {
        use super::WithProcess::Current;
        // The process can be '(uninterruptible) sleeping' or 'running': it looks like the state
        // field of /proc/pid/stat will show the state for the main thread of the process rather
        // than for the process as a whole.
        let state = read_proc_stat::<char>(Current, 2).unwrap();
        assert!("SDR".contains(state), "{state} is not S, D or R");
        let parent = Process::parent_id().unwrap();
        // field 3 is always the parent process
        assert_eq!(
            parent,
            ProcessId::new(read_proc_stat::<i32>(Current, 3).unwrap())
        );
        // the start time of this process must be readable and nonzero
        assert!(Process::starting_time_ticks(Current).unwrap() > 0);
    }

    #[test]
    fn hostname_does_not_panic() {
        let host = Hostname::resolve();
        assert!(!host.is_empty());
    }
}
