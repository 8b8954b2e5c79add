//! Verifying that the invoker is who they claim to be.
//!
//! Exactly one authentication provider is compiled in: crypt(3) against the
//! system password hashes, a PAM conversation, or none at all (in which case
//! only `nopass` rules can ever succeed).

pub(crate) mod rpassword;
pub(crate) mod securemem;

#[cfg(feature = "pam")]
mod pam_session;
#[cfg(feature = "shadow")]
mod shadow;

use crate::common::resolve::CurrentUser;
use crate::common::{Error, IdentString};
use crate::system::Hostname;

/// What the authenticator is asked to do, decided by the matched rule and
/// the command line.
pub struct AuthRequest<'a> {
    pub invoker: &'a CurrentUser,
    /// who the invoker wants to become; PAM opens the session for this user
    pub target_name: &'a IdentString,
    /// false when `-n` was given: fail rather than prompt
    pub interactive: bool,
    pub nopass: bool,
    pub persist: bool,
}

/// The password prompt, printed over whatever half-typed input is on the
/// terminal line.
#[cfg_attr(not(any(feature = "pam", feature = "shadow")), allow(dead_code))]
fn password_prompt(invoker: &str) -> String {
    let host = Hostname::resolve();
    format!("\rdoas ({invoker:.32}@{host:.32}) password: ", host = &*host)
}

#[cfg(feature = "shadow")]
pub use shadow::authenticate;

#[cfg(feature = "pam")]
pub use pam_session::authenticate;

/// Without an authentication provider, only `nopass` rules may succeed.
#[cfg(not(any(feature = "shadow", feature = "pam")))]
pub fn authenticate(request: &AuthRequest) -> Result<(), Error> {
    let _ = (request.invoker, request.target_name, request.persist);
    if request.nopass {
        Ok(())
    } else {
        Err(Error::auth("Authorization required"))
    }
}

/// Drop the persistence tokens of the current session (the `-L` flow).
pub fn clear_persistence() -> Result<(), Error> {
    #[cfg(feature = "timestamp")]
    crate::system::timestamp::clear()?;

    Ok(())
}

#[cfg(test)]
mod test {
    #[test]
    fn prompt_has_the_expected_shape() {
        let prompt = super::password_prompt("operator");
        assert!(prompt.starts_with("\rdoas (operator@"));
        assert!(prompt.ends_with(") password: "));
    }

    #[test]
    fn prompt_clips_long_names() {
        let prompt = super::password_prompt(&"x".repeat(100));
        let name = prompt
            .strip_prefix("\rdoas (")
            .unwrap()
            .split('@')
            .next()
            .unwrap();
        assert_eq!(name.len(), 32);
    }
}
