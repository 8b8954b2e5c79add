use std::ffi::CStr;
use std::io;
use std::path::Path;

use crate::auth::{self, AuthRequest};
use crate::common::resolve::{resolve_target_uid, CurrentUser};
use crate::common::{CommandAndArguments, Context, Error};
use crate::config::{check_permission, Config, Request, Rule};
use crate::doas::cli::{DoasCheckOptions, DoasRunOptions};
use crate::doas::{diagnostic, env};
use crate::exec;
use crate::log::{auth_info, auth_warn};
use crate::system::interface::{UnixUser, UserId, UID_MAX};
use crate::system::{self, Group, User};

/// The target side of a request before the policy has granted anything: all
/// the matcher may look at is the uid the invoker asked for.
struct TargetUid(UserId);

impl UnixUser for TargetUid {
    fn has_uid(&self, uid: UserId) -> bool {
        uid.inner() != UID_MAX && self.0 == uid
    }

    fn has_name(&self, name: &CStr) -> bool {
        match User::from_name(name) {
            Ok(Some(user)) => user.uid.inner() != UID_MAX && user.uid == self.0,
            _ => false,
        }
    }
}

fn reject_on_errors(
    config: Config,
    errors: Vec<crate::config::Error>,
    path: &Path,
) -> Result<Config, Error> {
    if errors.is_empty() {
        return Ok(config);
    }
    for error in &errors {
        match &error.location {
            Some(span) => diagnostic::cited_error(&error.message, span.clone(), path),
            None => {
                eprintln_ignore_io_error!("doas: {}: {}", path.display(), error.message)
            }
        }
    }
    Err(Error::Configuration(format!(
        "{} contains syntax errors",
        path.display()
    )))
}

fn parse_privileged_config() -> Result<Config, Error> {
    let path = Path::new(super::DOAS_CONF);
    let (config, errors) = match Config::open(path, true) {
        Ok(parsed) => parsed,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(Error::Configuration(format!(
                "doas is not enabled, {}",
                path.display()
            )))
        }
        Err(err) => return Err(Error::Configuration(err.to_string())),
    };
    reject_on_errors(config, errors, path)
}

pub fn run(options: DoasRunOptions) -> Result<(), Error> {
    let context = Context::build_from_options(options)?;

    // everything after this point relies on being able to become the target
    if User::effective_uid() != UserId::ROOT {
        return Err(Error::NotSetuid);
    }

    let config = parse_privileged_config()?;

    let invoker_name = context.current_user.name.clone();
    let cmdline = context.command.to_string();

    let target = TargetUid(context.target_uid);
    let request = Request {
        target: &target,
        command: &context.command.command,
        arguments: &context.command.arguments,
    };

    let rule = match check_permission(&config, &*context.current_user, &request) {
        Some(rule) if rule.permits() => rule,
        _ => {
            auth_warn!("command not permitted for {invoker_name}: {cmdline}");
            return Err(Error::NotAllowed);
        }
    };

    // capture the invoker-side state before anything is rebuilt
    let former_path = std::env::var("PATH").unwrap_or_default();
    let invoker_env = env::system_environment();

    // the target context only comes into existence once the policy permits it
    let target_user = User::from_uid(context.target_uid)?
        .ok_or_else(|| Error::UserNotFound(context.target_uid.to_string()))?;
    let target_group = Group::from_gid(target_user.gid)?.unwrap_or(Group {
        gid: target_user.gid,
        name: None,
    });

    // in PAM mode this forks: the code below runs in the child while the
    // parent waits to close the session
    auth::authenticate(&AuthRequest {
        invoker: &context.current_user,
        target_name: &target_user.name,
        interactive: !context.non_interactive,
        nopass: rule.options.nopass,
        persist: rule.options.persist,
    })?;

    let environment = env::build_environment(rule, &invoker_env, &target_user, &former_path);

    system::become_user(&target_user, &target_group)?;

    if !rule.options.nolog {
        let cwd = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|_| "(failed)".to_string());
        auth_info!(
            "{invoker_name} ran command {cmdline} as {} from {cwd}",
            target_user.name
        );
    }

    let error = exec::run_command(&context.command, environment);

    // control only returns here when the exec itself failed
    if error.kind() == io::ErrorKind::NotFound {
        Err(Error::CommandNotFound(context.command.command.into()))
    } else {
        Err(Error::IoError(Some(context.command.command.into()), error))
    }
}

pub fn run_check(options: DoasCheckOptions) -> Result<(), Error> {
    // evaluating an arbitrary config file is done with the invoker's own
    // privileges, before the file is even opened
    system::drop_privileges()?;

    let (config, errors) = Config::open(&options.config, false).map_err(|err| {
        Error::Configuration(format!(
            "could not open config file {}: {err}",
            options.config.display()
        ))
    })?;
    let config = reject_on_errors(config, errors, &options.config)?;

    // without a request to evaluate this is a pure syntax check
    if options.positional_args.is_empty() {
        return Ok(());
    }

    let command = CommandAndArguments::build_from_args(options.positional_args);
    let current_user = CurrentUser::resolve()?;
    let target_uid = match &options.user {
        Some(name_or_id) => resolve_target_uid(name_or_id)?,
        None => UserId::ROOT,
    };

    let request = Request {
        target: &TargetUid(target_uid),
        command: &command.command,
        arguments: &command.arguments,
    };

    match check_permission(&config, &*current_user, &request) {
        Some(rule) if rule.permits() => {
            let nopass = if rule.options.nopass { " nopass" } else { "" };
            println_ignore_io_error!("permit{nopass}");
            Ok(())
        }
        _ => {
            println_ignore_io_error!("deny");
            std::process::exit(1);
        }
    }
}
