use crate::common::command::CommandAndArguments;
use crate::common::resolve::{resolve_shell, resolve_target_uid, CurrentUser};
use crate::common::Error;
use crate::doas::cli::DoasRunOptions;
use crate::system::interface::UserId;

/// Everything the policy check needs to know about the request, captured
/// once before any privileged operation happens.
#[derive(Debug)]
pub struct Context {
    pub command: CommandAndArguments,
    pub current_user: CurrentUser,
    pub target_uid: UserId,
    pub non_interactive: bool,
}

impl Context {
    pub fn build_from_options(options: DoasRunOptions) -> Result<Context, Error> {
        let current_user = CurrentUser::resolve()?;

        let args = if options.shell {
            vec![resolve_shell(&current_user)]
        } else {
            options.positional_args
        };
        let command = CommandAndArguments::build_from_args(args);

        let target_uid = match &options.user {
            Some(name_or_id) => resolve_target_uid(name_or_id)?,
            None => UserId::ROOT,
        };

        Ok(Context {
            command,
            current_user,
            target_uid,
            non_interactive: options.non_interactive,
        })
    }
}
