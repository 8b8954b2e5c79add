use std::{fmt, path::PathBuf};

#[derive(Debug)]
pub enum Error {
    /// the request was denied by policy; the caller has already logged why
    NotAllowed,
    NotSetuid,
    CommandNotFound(PathBuf),
    UserNotFound(String),
    Authentication(String),
    Configuration(String),
    Options(String),
    #[cfg(feature = "pam")]
    Pam(crate::pam::PamError),
    IoError(Option<PathBuf>, std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotAllowed => write!(f, "Operation not permitted"),
            Error::NotSetuid => write!(f, "not installed setuid"),
            Error::CommandNotFound(p) => write!(f, "{}: command not found", p.display()),
            Error::UserNotFound(u) => write!(f, "unknown user {u}"),
            Error::Authentication(e) => write!(f, "{e}"),
            Error::Configuration(e) => write!(f, "{e}"),
            Error::Options(e) => write!(f, "{e}"),
            #[cfg(feature = "pam")]
            Error::Pam(e) => write!(f, "{e}"),
            Error::IoError(location, e) => {
                if let Some(path) = location {
                    write!(f, "{}: {e}", path.display())
                } else {
                    write!(f, "{e}")
                }
            }
        }
    }
}

#[cfg(feature = "pam")]
impl From<crate::pam::PamError> for Error {
    fn from(err: crate::pam::PamError) -> Self {
        Error::Pam(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(None, err)
    }
}

impl Error {
    pub fn auth(message: &str) -> Self {
        Self::Authentication(message.to_string())
    }
}
