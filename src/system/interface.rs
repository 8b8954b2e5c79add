use std::ffi::CStr;
use std::fmt;

/// The uid/gid ceiling: `(uid_t)-1` is used as an error sentinel by several
/// libc interfaces and must never match or be targeted by a rule.
pub const UID_MAX: libc::uid_t = libc::uid_t::MAX;
pub const GID_MAX: libc::gid_t = libc::gid_t::MAX;

#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct UserId(libc::uid_t);
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct GroupId(libc::gid_t);
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct ProcessId(libc::pid_t);

impl UserId {
    pub const ROOT: UserId = UserId(0);

    pub fn new(id: libc::uid_t) -> UserId {
        UserId(id)
    }

    pub fn inner(&self) -> libc::uid_t {
        self.0
    }
}

impl GroupId {
    pub fn new(id: libc::gid_t) -> GroupId {
        GroupId(id)
    }

    pub fn inner(&self) -> libc::gid_t {
        self.0
    }
}

impl ProcessId {
    pub fn new(id: libc::pid_t) -> ProcessId {
        ProcessId(id)
    }

    pub fn inner(&self) -> libc::pid_t {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the policy matcher needs to know about a user. The real
/// implementation resolves rule literals through the name service; test
/// doubles can answer from a table instead.
pub trait UnixUser {
    /// Does `name` resolve to this user's uid?
    fn has_name(&self, _name: &CStr) -> bool {
        false
    }
    fn has_uid(&self, _uid: UserId) -> bool {
        false
    }
    /// Does `name` resolve to a gid in this user's group set?
    fn in_group_by_name(&self, _name: &CStr) -> bool {
        false
    }
    fn in_group_by_gid(&self, _gid: GroupId) -> bool {
        false
    }
}

impl UnixUser for super::User {
    fn has_name(&self, name: &CStr) -> bool {
        match super::User::from_name(name) {
            Ok(Some(other)) => other.uid.inner() != UID_MAX && other.uid == self.uid,
            _ => false,
        }
    }

    fn has_uid(&self, uid: UserId) -> bool {
        uid.inner() != UID_MAX && self.uid == uid
    }

    fn in_group_by_name(&self, name: &CStr) -> bool {
        match super::Group::from_name(name) {
            Ok(Some(group)) => self.in_group_by_gid(group.gid),
            _ => false,
        }
    }

    fn in_group_by_gid(&self, gid: GroupId) -> bool {
        gid.inner() != GID_MAX && self.groups.contains(&gid)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::system::{Group, User};

    #[test]
    fn test_ids() {
        let uid = UserId::new(1000);
        assert_eq!(uid.inner(), 1000);
        assert_eq!(format!("{uid}"), "1000");
        assert_eq!(GroupId::new(7).inner(), 7);
        assert!(ProcessId::new(42).is_valid());
        assert!(!ProcessId::new(0).is_valid());
    }

    #[test]
    fn test_unix_user_resolution() {
        let root = User::from_uid(UserId::ROOT).unwrap().unwrap();
        assert!(root.has_name(cstr!("root")));
        assert!(root.has_uid(UserId::ROOT));
        assert!(!root.has_name(cstr!("this-user-does-not-exist")));

        let root_group = Group::from_gid(GroupId::new(0)).unwrap().unwrap();
        assert_eq!(root_group.gid, GroupId::new(0));
    }

    #[test]
    fn ceiling_ids_never_match() {
        let mut root = User::from_uid(UserId::ROOT).unwrap().unwrap();
        root.uid = UserId::new(UID_MAX);
        root.groups = vec![GroupId::new(GID_MAX)];
        assert!(!root.has_uid(UserId::new(UID_MAX)));
        assert!(!root.in_group_by_gid(GroupId::new(GID_MAX)));
    }
}
