//! Password verification against the system hashes via crypt(3).

use std::ffi::CStr;
use std::mem::MaybeUninit;

use crate::common::Error;
use crate::cutils::{cerr, string_from_ptr, sysconf};
use crate::log::auth_warn;

use super::rpassword::Terminal;
use super::{password_prompt, AuthRequest};

#[link(name = "crypt")]
extern "C" {
    fn crypt(key: *const libc::c_char, salt: *const libc::c_char) -> *mut libc::c_char;
}

pub fn authenticate(request: &AuthRequest) -> Result<(), Error> {
    let _ = request.target_name;

    if request.nopass {
        return Ok(());
    }
    if !request.interactive {
        auth_warn!("a password is required for {}", request.invoker.name);
        return Err(Error::auth("Authorization required"));
    }

    #[cfg(feature = "timestamp")]
    {
        use crate::system::timestamp;

        let mut token = if request.persist {
            Some(timestamp::open(timestamp::LIFETIME).map_err(|err| Error::auth(&err.to_string()))?)
        } else {
            None
        };

        if !matches!(token, Some((_, true))) {
            verify_password(&request.invoker.name)?;
        }

        if let Some((file, _)) = &mut token {
            // failing to refresh the token only means the next invocation
            // prompts again
            let _ = timestamp::set(file, timestamp::LIFETIME);
        }

        Ok(())
    }

    #[cfg(not(feature = "timestamp"))]
    verify_password(&request.invoker.name)
}

fn verify_password(name: &crate::common::IdentString) -> Result<(), Error> {
    let auth_failed = || Error::auth("Authentication failed");

    let hash = password_hash(name.as_cstr())?;

    let mut tty = Terminal::open_tty().map_err(|_| {
        auth_warn!("tty required for {name}");
        Error::auth("a tty is required")
    })?;

    let response = tty
        .read_input(&password_prompt(name), true)
        .map_err(|err| Error::auth(&err.to_string()))?;
    let response = CStr::from_bytes_until_nul(&response).map_err(|_| auth_failed())?;

    let c_hash = std::ffi::CString::new(hash.as_str()).map_err(|_| auth_failed())?;
    // SAFETY: both arguments are valid C strings; the result is a pointer
    // into static libc storage (or NULL on failure), which we only read
    let encrypted = unsafe { crypt(response.as_ptr(), c_hash.as_ptr()) };
    // SAFETY: `encrypted` is NULL or a valid C string owned by libc
    let encrypted = unsafe { string_from_ptr(encrypted) };

    if !constant_time_eq(encrypted.as_bytes(), hash.as_bytes()) {
        auth_warn!("failed auth for {name}");
        return Err(auth_failed());
    }

    Ok(())
}

/// The invoker's password hash: from the passwd entry if it holds one, from
/// the shadow file if the passwd field is the "x" sentinel. A `*`-locked
/// passwd entry is a hard failure.
fn password_hash(name: &CStr) -> Result<String, Error> {
    let auth_failed = || Error::auth("Authentication failed");

    let max_pw_size = sysconf(libc::_SC_GETPW_R_SIZE_MAX).unwrap_or(16_384);
    let mut buf = vec![0; max_pw_size as usize];
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut pwd_ptr = std::ptr::null_mut();
    // SAFETY: getpwnam_r is passed a buffer of the size we claim; the
    // pwd struct is only read after a successful, non-null result
    cerr(unsafe {
        libc::getpwnam_r(
            name.as_ptr(),
            pwd.as_mut_ptr(),
            buf.as_mut_ptr(),
            buf.len(),
            &mut pwd_ptr,
        )
    })?;
    if pwd_ptr.is_null() {
        return Err(auth_failed());
    }
    // SAFETY: getpwnam_r succeeded and reported an entry
    let pwd = unsafe { pwd.assume_init() };
    // SAFETY: pw_passwd points to a string initialized by getpwnam_r
    let hash = unsafe { string_from_ptr(pwd.pw_passwd) };

    if hash == "x" {
        let mut buf = vec![0; max_pw_size as usize];
        let mut spwd = MaybeUninit::<libc::spwd>::uninit();
        let mut spwd_ptr = std::ptr::null_mut();
        // SAFETY: analogous to getpwnam_r above
        cerr(unsafe {
            libc::getspnam_r(
                name.as_ptr(),
                spwd.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut spwd_ptr,
            )
        })?;
        if spwd_ptr.is_null() {
            return Err(auth_failed());
        }
        // SAFETY: getspnam_r succeeded and reported an entry
        let spwd = unsafe { spwd.assume_init() };
        // SAFETY: sp_pwdp points to a string initialized by getspnam_r
        Ok(unsafe { string_from_ptr(spwd.sp_pwdp) })
    } else if hash.starts_with('*') {
        // a locked account cannot authenticate
        Err(auth_failed())
    } else {
        Ok(hash)
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    // the lengths of the inputs are not secrets, only their content is
    if left.len() != right.len() {
        return false;
    }

    let mut difference = 0u8;
    for (a, b) in left.iter().zip(right) {
        difference |= a ^ b;
    }
    difference == 0
}

#[cfg(test)]
mod test {
    use super::constant_time_eq;

    #[test]
    fn comparison_works() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"$6$salt$hash", b"$6$salt$hash"));
        assert!(!constant_time_eq(b"$6$salt$hash", b"$6$salt$hasi"));
        assert!(!constant_time_eq(b"$6$salt$hash", b"$6$salt$has"));
        assert!(!constant_time_eq(b"abc", b""));
    }
}
