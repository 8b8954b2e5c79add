#[macro_use]
mod macros;
pub(crate) mod auth;
pub(crate) mod common;
pub(crate) mod config;
pub(crate) mod cutils;
pub(crate) mod exec;
pub(crate) mod log;
#[cfg(feature = "pam")]
pub(crate) mod pam;
pub(crate) mod system;

mod doas;

pub use doas::main as doas_main;

#[cfg(all(feature = "pam", feature = "shadow"))]
compile_error!("the 'pam' and 'shadow' authenticators are mutually exclusive");
