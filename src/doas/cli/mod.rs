#![forbid(unsafe_code)]

use std::path::PathBuf;

use crate::common::IdentString;

pub mod help;

#[cfg(test)]
mod tests;

pub enum DoasAction {
    /// execute a command as the target user
    Run(DoasRunOptions),
    /// `-C`: evaluate a request against an arbitrary config and report
    Check(DoasCheckOptions),
    /// `-L`: clear the persisted authentication for this session
    ClearPersist,
}

#[derive(Debug, Default, PartialEq)]
pub struct DoasRunOptions {
    // -n
    pub non_interactive: bool,
    // -s
    pub shell: bool,
    // -u
    pub user: Option<IdentString>,
    pub positional_args: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub struct DoasCheckOptions {
    // -C
    pub config: PathBuf,
    // -u
    pub user: Option<IdentString>,
    /// the request to evaluate; empty means only check the syntax
    pub positional_args: Vec<String>,
}

impl DoasAction {
    pub fn from_env() -> Result<Self, String> {
        Self::try_parse_from(std::env::args())
    }

    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        DoasOptions::try_parse_from(iter)?.validate()
    }
}

/// The raw results of option parsing, before the flag combination rules
/// have been applied.
#[derive(Debug, Default, PartialEq)]
struct DoasOptions {
    config: Option<PathBuf>,
    clear_persist: bool,
    non_interactive: bool,
    shell: bool,
    user: Option<IdentString>,
    positional_args: Vec<String>,
}

impl DoasOptions {
    /// Parse the given command line arguments. Flag parsing stops at the
    /// first positional argument, so that the options of the requested
    /// command are left alone.
    fn try_parse_from<I, T>(iter: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut options = DoasOptions::default();
        let mut arg_iter = iter.into_iter().map(Into::into).skip(1);

        while let Some(arg) = arg_iter.next() {
            let Some(flags) = arg.strip_prefix('-') else {
                // the command starts here; -C also takes a command to evaluate
                options.positional_args.push(arg);
                options.positional_args.extend(arg_iter);
                break;
            };

            if flags == "-" {
                options.positional_args.extend(arg_iter);
                break;
            }
            if flags.is_empty() {
                // a lone "-" is not an option
                options.positional_args.push(arg);
                options.positional_args.extend(arg_iter);
                break;
            }

            let mut chars = flags.chars();
            while let Some(flag) = chars.next() {
                // a flag that takes a value eats the rest of the argument,
                // or the next one
                let mut value = || {
                    let rest: String = chars.by_ref().collect();
                    if !rest.is_empty() {
                        Ok(rest)
                    } else {
                        arg_iter
                            .next()
                            .ok_or_else(|| format!("option '-{flag}' requires an argument"))
                    }
                };

                match flag {
                    'C' => options.config = Some(PathBuf::from(value()?)),
                    'L' => options.clear_persist = true,
                    'n' => options.non_interactive = true,
                    's' => options.shell = true,
                    'u' => options.user = Some(IdentString::from_cli_string(value()?)),
                    _ => return Err(format!("unknown option: '-{flag}'")),
                }
            }
        }

        Ok(options)
    }

    fn validate(self) -> Result<DoasAction, String> {
        let DoasOptions {
            config,
            clear_persist,
            non_interactive,
            shell,
            user,
            positional_args,
        } = self;

        if clear_persist {
            return Ok(DoasAction::ClearPersist);
        }

        if let Some(config) = config {
            if shell {
                return Err("the '-s' and '-C' options are mutually exclusive".to_string());
            }
            return Ok(DoasAction::Check(DoasCheckOptions {
                config,
                user,
                positional_args,
            }));
        }

        if shell && !positional_args.is_empty() {
            return Err("the '-s' option cannot be combined with a command".to_string());
        }
        if !shell && positional_args.is_empty() {
            return Err("no command specified".to_string());
        }

        Ok(DoasAction::Run(DoasRunOptions {
            non_interactive,
            shell,
            user,
            positional_args,
        }))
    }
}
