use core::fmt;
use std::{env, ops};

use crate::common::{Error, IdentString};
use crate::system::interface::{UserId, UID_MAX};
use crate::system::{self, User};

/// The invoker of the program: the real user, with the supplementary group
/// set taken from the kernel (`getgroups`), not recomputed from the name
/// service, plus the real gid.
#[derive(Clone)]
pub struct CurrentUser {
    inner: User,
}

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CurrentUser").field(&self.inner).finish()
    }
}

impl ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl CurrentUser {
    pub fn resolve() -> Result<Self, Error> {
        let mut user =
            User::real()?.ok_or_else(|| Error::UserNotFound("current user".to_string()))?;

        let mut groups = system::process_groups()?;
        let real_gid = User::real_gid();
        if !groups.contains(&real_gid) {
            groups.push(real_gid);
        }
        user.groups = groups;

        Ok(Self { inner: user })
    }
}

/// Resolve a `-u` argument to a target uid: a known user name wins, otherwise
/// the argument is read as a numeric id. The uid ceiling never resolves.
pub fn resolve_target_uid(name_or_id: &IdentString) -> Result<UserId, Error> {
    let unknown = || Error::UserNotFound(name_or_id.to_string());

    if let Some(user) = User::from_name(name_or_id.as_cstr())? {
        if user.uid.inner() == UID_MAX {
            return Err(unknown());
        }
        return Ok(user.uid);
    }

    let uid: libc::uid_t = name_or_id.parse().map_err(|_| unknown())?;
    if uid == UID_MAX {
        return Err(unknown());
    }
    Ok(UserId::new(uid))
}

/// The shell used for `-s`: a non-empty `$SHELL` wins over the invoker's
/// passwd entry.
pub fn resolve_shell(current_user: &User) -> String {
    match env::var("SHELL") {
        Ok(shell) if !shell.is_empty() => shell,
        _ => current_user.shell.to_string_lossy().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_target_uid, CurrentUser};
    use crate::system::interface::UserId;

    #[test]
    fn can_resolve_the_current_user() {
        let user = CurrentUser::resolve().unwrap();
        assert_eq!(user.uid, crate::system::User::real_uid());
        assert!(user.groups.contains(&crate::system::User::real_gid()));
    }

    #[test]
    fn resolves_root_by_name_and_id() {
        assert_eq!(resolve_target_uid(&"root".into()).unwrap(), UserId::ROOT);
        assert_eq!(resolve_target_uid(&"0".into()).unwrap(), UserId::ROOT);
    }

    #[test]
    fn rejects_unknown_and_ceiling_uids() {
        assert!(resolve_target_uid(&"no_such_user_here".into()).is_err());
        assert!(resolve_target_uid(&"4294967295".into()).is_err());
        assert!(resolve_target_uid(&"not-a-number-".into()).is_err());
    }
}
