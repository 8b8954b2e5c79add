#![deny(unsafe_code)]

use crate::auth;
use crate::common::Error;
use crate::system;

pub(crate) mod cli;
pub(crate) mod diagnostic;
mod env;
mod pipeline;

use cli::DoasAction;

/// The compiled-in policy file.
pub(crate) const DOAS_CONF: &str = "/etc/doas.conf";

fn doas_process() -> Result<(), Error> {
    crate::log::DoasLogger::new("doas: ").into_global_logger();

    // nothing above stderr may leak into the target program
    system::mark_fds_as_cloexec()?;

    match DoasAction::from_env() {
        Ok(DoasAction::ClearPersist) => auth::clear_persistence(),
        Ok(DoasAction::Check(options)) => pipeline::run_check(options),
        Ok(DoasAction::Run(options)) => pipeline::run(options),
        Err(reason) => {
            eprintln_ignore_io_error!("doas: {reason}\n{}", cli::help::USAGE_MSG);
            std::process::exit(1);
        }
    }
}

pub fn main() {
    match doas_process() {
        Ok(()) => (),
        Err(error) => {
            diagnostic::diagnostic!("{error}");
            std::process::exit(1);
        }
    }
}
