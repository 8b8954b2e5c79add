#![forbid(unsafe_code)]

use std::io;
use std::process::Command;

use crate::common::{CommandAndArguments, Environment};

/// Hand control to the requested program. The caller has already switched
/// to the target identity and constructed the exact outgoing environment;
/// nothing of the invoker's environment leaks through `exec`.
///
/// The PATH search for a bare command name uses the PATH of the new
/// environment: libstd installs `env` before performing the exec.
///
/// Only returns on failure.
pub fn run_command(command: &CommandAndArguments, env: Environment) -> io::Error {
    let mut cmd = Command::new(&command.command);
    cmd.args(&command.arguments).env_clear().envs(env);

    use std::os::unix::process::CommandExt;
    cmd.exec()
}
