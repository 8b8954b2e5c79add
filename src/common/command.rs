use std::fmt;

/// The maximum length of the command line recorded in the audit trail;
/// anything beyond this is silently truncated (the exec itself is unaffected).
const AUDIT_LINE_MAX: usize = 2048;

/// The command requested by the invoker: `argv[0]` exactly as given (the
/// PATH search happens at exec time) plus the argument tail.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommandAndArguments {
    pub command: String,
    pub arguments: Vec<String>,
}

impl CommandAndArguments {
    pub fn build_from_args(mut args: Vec<String>) -> CommandAndArguments {
        if args.is_empty() {
            return Default::default();
        }
        let command = args.remove(0);

        CommandAndArguments {
            command,
            arguments: args,
        }
    }
}

/// Used to report the requested command line to syslog; truncation is
/// preferred over failure here.
impl fmt::Display for CommandAndArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.command.clone();
        for arg in &self.arguments {
            if line.len() + arg.len() + 1 > AUDIT_LINE_MAX {
                break;
            }
            line.push(' ');
            line.push_str(arg);
        }

        f.write_str(&line)
    }
}

#[cfg(test)]
mod test {
    use super::CommandAndArguments;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_command_and_args() {
        let cmd = CommandAndArguments::build_from_args(vec!["ls".into(), "-l".into()]);
        assert_eq!(cmd.command, "ls");
        assert_eq!(cmd.arguments, ["-l"]);
        assert_eq!(cmd.to_string(), "ls -l");

        let empty = CommandAndArguments::build_from_args(vec![]);
        assert_eq!(empty, CommandAndArguments::default());
    }

    #[test]
    fn audit_line_is_truncated() {
        let long = "x".repeat(4096);
        let cmd = CommandAndArguments::build_from_args(vec!["echo".into(), long]);
        assert_eq!(cmd.to_string(), "echo");
    }
}
