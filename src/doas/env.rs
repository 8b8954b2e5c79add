use std::ffi::OsStr;

use crate::common::Environment;
use crate::config::{EnvDirective, Rule};
use crate::system::User;

/// Where the PATH points when the matched rule names a command: a fixed list
/// the invoker has no influence over.
pub const SAFE_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin:/usr/local/bin:/usr/local/sbin";

/// Variables that survive into the target environment even without
/// `keepenv`; everything else is discarded.
const KEEP: &[&str] = &[
    "DISPLAY", "HOME", "LOGNAME", "MAIL", "PATH", "PS1", "SHELL", "TERM", "USER", "USERNAME",
    "COLORTERM", "LANG",
];

fn always_kept(key: &OsStr) -> bool {
    KEEP.iter().any(|&k| key == k) || key.to_str().is_some_and(|k| k.starts_with("LC_"))
}

/// obtain the system environment
pub fn system_environment() -> Environment {
    std::env::vars_os().collect()
}

/// Compute the environment of the target process: a base from the invoker
/// (everything under `keepenv`, a short list of benign variables otherwise),
/// the target user's own identity variables, then the rule's `setenv`
/// directives in order, and the PATH policy on top of it all.
pub fn build_environment(
    rule: &Rule,
    invoker_env: &Environment,
    target: &User,
    former_path: &str,
) -> Environment {
    let mut environment: Environment = if rule.options.keepenv {
        invoker_env.clone()
    } else {
        invoker_env
            .iter()
            .filter(|(key, _)| always_kept(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    };

    environment.insert("HOME".into(), target.home.clone().into());
    environment.insert("LOGNAME".into(), target.name.as_str().into());
    environment.insert("USER".into(), target.name.as_str().into());
    environment.insert("USERNAME".into(), target.name.as_str().into());

    for directive in &rule.envlist {
        match directive {
            EnvDirective::Keep(name) => {
                if let Some(value) = invoker_env.get(OsStr::new(name)) {
                    environment.insert(name.into(), value.clone());
                }
            }
            EnvDirective::Set(name, value) => {
                environment.insert(name.into(), value.into());
            }
            EnvDirective::Unset(name) => {
                environment.remove(OsStr::new(name));
            }
        }
    }

    // applied last: a rule that pins the command also pins the PATH, and no
    // setenv directive can override that
    if rule.command.is_some() {
        environment.insert("PATH".into(), SAFE_PATH.into());
    } else {
        environment.insert("PATH".into(), former_path.into());
    }

    environment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::system::interface::{GroupId, UserId};
    use pretty_assertions::assert_eq;
    use std::ffi::OsString;

    fn target() -> User {
        User {
            uid: UserId::new(0),
            gid: GroupId::new(0),
            name: "root".into(),
            home: "/root".into(),
            shell: "/bin/sh".into(),
            groups: vec![GroupId::new(0)],
        }
    }

    fn invoker_env() -> Environment {
        [
            ("HOME", "/home/alice"),
            ("USER", "alice"),
            ("LOGNAME", "alice"),
            ("PATH", "/home/alice/bin:/usr/bin"),
            ("TERM", "xterm-256color"),
            ("LANG", "en_US.UTF-8"),
            ("LC_ALL", "C"),
            ("SHELL", "/bin/zsh"),
            ("SSH_AUTH_SOCK", "/tmp/agent.1000"),
            ("LD_PRELOAD", "/tmp/evil.so"),
            ("EDITOR", "vi"),
        ]
        .into_iter()
        .map(|(k, v)| (OsString::from(k), OsString::from(v)))
        .collect()
    }

    fn rule(line: &str) -> Rule {
        let (config, errors) = Config::read(format!("{line}\n").as_bytes()).unwrap();
        assert!(errors.is_empty());
        config.rules()[0].clone()
    }

    fn get<'a>(env: &'a Environment, key: &str) -> Option<&'a str> {
        env.get(OsStr::new(key)).and_then(|v| v.to_str())
    }

    #[test]
    fn default_environment_is_scrubbed() {
        let env = build_environment(&rule("permit alice"), &invoker_env(), &target(), "/usr/bin");

        // dangerous and irrelevant variables are gone
        assert_eq!(get(&env, "SSH_AUTH_SOCK"), None);
        assert_eq!(get(&env, "LD_PRELOAD"), None);
        assert_eq!(get(&env, "EDITOR"), None);

        // benign terminal state survives
        assert_eq!(get(&env, "TERM"), Some("xterm-256color"));
        assert_eq!(get(&env, "LANG"), Some("en_US.UTF-8"));
        assert_eq!(get(&env, "LC_ALL"), Some("C"));
        // no login shell is involved, so SHELL stays what it was
        assert_eq!(get(&env, "SHELL"), Some("/bin/zsh"));
    }

    #[test]
    fn identity_variables_become_the_targets() {
        let env = build_environment(&rule("permit alice"), &invoker_env(), &target(), "");
        assert_eq!(get(&env, "HOME"), Some("/root"));
        assert_eq!(get(&env, "LOGNAME"), Some("root"));
        assert_eq!(get(&env, "USER"), Some("root"));
        assert_eq!(get(&env, "USERNAME"), Some("root"));
    }

    #[test]
    fn keepenv_passes_the_invoker_environment() {
        let env = build_environment(
            &rule("permit keepenv alice"),
            &invoker_env(),
            &target(),
            "/usr/bin",
        );
        assert_eq!(get(&env, "SSH_AUTH_SOCK"), Some("/tmp/agent.1000"));
        assert_eq!(get(&env, "EDITOR"), Some("vi"));
        // but the identity of the target still wins
        assert_eq!(get(&env, "HOME"), Some("/root"));
        assert_eq!(get(&env, "USER"), Some("root"));
    }

    #[test]
    fn envlist_applies_in_order() {
        let env = build_environment(
            &rule("permit setenv { EDITOR FOO=bar -TERM FOO=baz } alice"),
            &invoker_env(),
            &target(),
            "/usr/bin",
        );
        assert_eq!(get(&env, "EDITOR"), Some("vi"));
        assert_eq!(get(&env, "FOO"), Some("baz"));
        assert_eq!(get(&env, "TERM"), None);
    }

    #[test]
    fn keep_directive_of_an_unset_variable_does_nothing() {
        let env = build_environment(
            &rule("permit setenv { NO_SUCH_VARIABLE } alice"),
            &invoker_env(),
            &target(),
            "",
        );
        assert_eq!(get(&env, "NO_SUCH_VARIABLE"), None);
    }

    #[test]
    fn path_follows_the_invoker_without_a_fixed_command() {
        let env = build_environment(&rule("permit alice"), &invoker_env(), &target(), "/my/path");
        assert_eq!(get(&env, "PATH"), Some("/my/path"));

        // an empty captured PATH is still set
        let env = build_environment(&rule("permit alice"), &invoker_env(), &target(), "");
        assert_eq!(get(&env, "PATH"), Some(""));
    }

    #[test]
    fn a_fixed_command_forces_the_safe_path() {
        let env = build_environment(
            &rule("permit alice cmd /bin/ls"),
            &invoker_env(),
            &target(),
            "/home/alice/bin",
        );
        assert_eq!(get(&env, "PATH"), Some(SAFE_PATH));

        // not even an explicit setenv wins over it
        let env = build_environment(
            &rule("permit setenv { PATH=/home/alice/bin } alice cmd /bin/ls"),
            &invoker_env(),
            &target(),
            "/home/alice/bin",
        );
        assert_eq!(get(&env, "PATH"), Some(SAFE_PATH));
    }

    #[test]
    fn nothing_unexpected_survives() {
        let env = build_environment(&rule("permit alice"), &invoker_env(), &target(), "/usr/bin");
        for key in env.keys() {
            let key = key.to_str().unwrap();
            assert!(
                super::always_kept(OsStr::new(key)),
                "unexpected variable: {key}"
            );
        }
    }
}
