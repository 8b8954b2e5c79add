use core::fmt;
use std::{ffi::CStr, ops};

use crate::common::Error;

/// A UTF-8 encoded string with no interior null bytes, usable as a user or
/// group name in name service lookups.
///
/// This type can be converted into a C (null-terminated) string at no cost.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentString {
    inner: String,
}

impl IdentString {
    pub fn new(mut string: String) -> Result<Self, Error> {
        if string.as_bytes().contains(&0) {
            return Err(Error::Options(format!(
                "invalid string with embedded null byte: {string:?}"
            )));
        }

        string.push('\0');

        Ok(Self { inner: string })
    }

    pub fn from_cli_string(cli_string: impl Into<String>) -> Self {
        Self::new(cli_string.into())
            .expect("strings that come in from CLI should not have interior null bytes")
    }

    pub fn as_cstr(&self) -> &CStr {
        CStr::from_bytes_with_nul(self.inner.as_bytes()).unwrap()
    }

    pub fn as_str(&self) -> &str {
        self
    }
}

impl TryFrom<String> for IdentString {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdentString> for String {
    fn from(value: IdentString) -> Self {
        let mut s = value.inner;
        s.pop();
        s
    }
}

impl ops::Deref for IdentString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        let num_bytes = self.inner.len();
        &self.inner[..num_bytes - 1]
    }
}

impl fmt::Debug for IdentString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &str = self;
        fmt::Debug::fmt(s, f)
    }
}

impl fmt::Display for IdentString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self)
    }
}

impl PartialEq<str> for IdentString {
    fn eq(&self, other: &str) -> bool {
        let s: &str = self;
        s == other
    }
}

impl PartialEq<&'_ str> for IdentString {
    fn eq(&self, other: &&str) -> bool {
        let s: &str = self;
        s == *other
    }
}

#[cfg(test)]
impl From<&'_ str> for IdentString {
    fn from(value: &'_ str) -> Self {
        IdentString::new(value.to_string()).unwrap()
    }
}
