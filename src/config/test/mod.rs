use super::*;
use crate::system::interface::{GroupId, UnixUser, UserId};
use pretty_assertions::assert_eq;
use std::ffi::CStr;

// a small world of users and groups, standing in for the name service
const USERS: &[(&str, libc::uid_t)] = &[("root", 0), ("alice", 1000), ("bob", 1001)];
const GROUPS: &[(&str, libc::gid_t)] = &[("wheel", 10), ("users", 100)];

struct Named {
    uid: libc::uid_t,
    gids: &'static [libc::gid_t],
}

fn alice() -> Named {
    Named {
        uid: 1000,
        gids: &[100, 10],
    }
}

fn bob() -> Named {
    Named {
        uid: 1001,
        gids: &[100],
    }
}

fn root() -> Named {
    Named { uid: 0, gids: &[0] }
}

impl UnixUser for Named {
    fn has_name(&self, name: &CStr) -> bool {
        let name = name.to_str().unwrap();
        USERS.iter().any(|&(n, uid)| n == name && uid == self.uid)
    }

    fn has_uid(&self, uid: UserId) -> bool {
        self.uid == uid.inner()
    }

    fn in_group_by_name(&self, name: &CStr) -> bool {
        let name = name.to_str().unwrap();
        GROUPS
            .iter()
            .any(|&(n, gid)| n == name && self.gids.contains(&gid))
    }

    fn in_group_by_gid(&self, gid: GroupId) -> bool {
        self.gids.contains(&gid.inner())
    }
}

fn parse(text: &str) -> (Config, Vec<Error>) {
    Config::read(text.as_bytes()).unwrap()
}

fn parse_ok(text: &str) -> Config {
    let (config, errors) = parse(text);
    assert!(
        errors.is_empty(),
        "unexpected parse errors: {:?}",
        errors.iter().map(|e| &e.message).collect::<Vec<_>>()
    );
    config
}

fn error_count(text: &str) -> usize {
    parse(text).1.len()
}

fn verdict(
    config: &Config,
    invoker: &Named,
    target: &Named,
    command: &str,
    args: &[&str],
) -> Option<bool> {
    let arguments: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let request = Request {
        target,
        command,
        arguments: &arguments,
    };
    check_permission(config, invoker, &request).map(Rule::permits)
}

mod grammar {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn a_simple_permit() {
        let config = parse_ok("permit alice\n");
        assert_eq!(config.rules().len(), 1);
        let rule = &config.rules()[0];
        assert_eq!(rule.action, Action::Permit);
        assert_eq!(rule.identity, Identity::User("alice".into()));
        assert_eq!(rule.target, None);
        assert_eq!(rule.command, None);
        assert_eq!(rule.args, None);
        assert_eq!(rule.options, Options::default());
    }

    #[test]
    fn comments_and_blank_lines() {
        let config = parse_ok("# a comment\n\n   \npermit alice # trailing\ndeny bob\n");
        assert_eq!(config.rules().len(), 2);
    }

    #[test]
    fn line_continuation() {
        let config = parse_ok("permit \\\n    alice \\\n    as root\n");
        assert_eq!(config.rules().len(), 1);
        assert_eq!(config.rules()[0].target, Some(Target::User("root".into())));
    }

    #[test]
    fn missing_final_newline_is_an_error() {
        assert_eq!(error_count("permit alice"), 1);
    }

    #[test]
    fn all_options() {
        let config = parse_ok("permit nopass nolog persist keepenv alice\n");
        let opts = &config.rules()[0].options;
        assert!(opts.nopass && opts.nolog && opts.persist && opts.keepenv);
    }

    #[test]
    fn duplicate_options_are_not_an_error() {
        let config = parse_ok("permit nopass nopass keepenv nopass alice\n");
        assert!(config.rules()[0].options.nopass);
    }

    #[test]
    fn persist_needs_permit() {
        assert_eq!(error_count("deny persist alice\n"), 1);
        assert_eq!(error_count("permit persist alice\n"), 0);
    }

    #[test]
    fn group_identities() {
        let config = parse_ok("permit :wheel\npermit :42\n");
        assert_eq!(config.rules()[0].identity, Identity::Group("wheel".into()));
        assert_eq!(config.rules()[1].identity, Identity::GroupId(42));
    }

    #[test]
    fn numeric_identities() {
        let config = parse_ok("permit 1000 as 0\n");
        assert_eq!(config.rules()[0].identity, Identity::UserId(1000));
        assert_eq!(config.rules()[0].target, Some(Target::UserId(0)));
    }

    #[test]
    fn ceiling_ids_are_rejected() {
        assert_eq!(error_count("permit 4294967295\n"), 1);
        assert_eq!(error_count("permit :4294967295\n"), 1);
        assert_eq!(error_count("permit alice as 4294967295\n"), 1);
        // out of range of uid_t altogether
        assert_eq!(error_count("permit 99999999999999\n"), 1);
    }

    #[test]
    fn quoted_words_are_never_keywords() {
        let config = parse_ok("permit \"nopass\"\n");
        assert_eq!(config.rules()[0].identity, Identity::User("nopass".into()));
        assert!(!config.rules()[0].options.nopass);

        // quoted digits make a name, not an id
        let config = parse_ok("permit \"1000\"\n");
        assert_eq!(config.rules()[0].identity, Identity::User("1000".into()));
    }

    #[test]
    fn command_and_args() {
        let config = parse_ok("permit alice cmd /bin/ls args -l /tmp\n");
        let rule = &config.rules()[0];
        assert_eq!(rule.command.as_deref(), Some("/bin/ls"));
        assert_eq!(
            rule.args,
            Some(vec!["-l".to_string(), "/tmp".to_string()])
        );
    }

    #[test]
    fn empty_args_list() {
        let config = parse_ok("permit alice cmd reboot args\n");
        assert_eq!(config.rules()[0].args, Some(vec![]));

        let config = parse_ok("permit alice cmd reboot\n");
        assert_eq!(config.rules()[0].args, None);
    }

    #[test]
    fn quoted_arguments() {
        let config = parse_ok("permit alice cmd /bin/echo args \"hello world\" \"\"\n");
        assert_eq!(
            config.rules()[0].args,
            Some(vec!["hello world".to_string(), String::new()])
        );
    }

    #[test]
    fn setenv_directives_in_order() {
        let config = parse_ok("permit setenv { PATH -MAIL EDITOR=vi GREETING=\"hi there\" } alice\n");
        use EnvDirective::*;
        assert_eq!(
            config.rules()[0].envlist,
            vec![
                Keep("PATH".to_string()),
                Unset("MAIL".to_string()),
                Set("EDITOR".to_string(), "vi".to_string()),
                Set("GREETING".to_string(), "hi there".to_string()),
            ]
        );
    }

    #[test]
    fn setenv_empty_value() {
        let config = parse_ok("permit setenv { FOO= } alice\n");
        assert_eq!(
            config.rules()[0].envlist,
            vec![EnvDirective::Set("FOO".to_string(), String::new())]
        );
    }

    #[test]
    fn syntax_errors_accumulate_and_recover() {
        let (config, errors) = parse("permit\nfrobnicate alice\npermit alice\ndeny persist bob\n");
        assert_eq!(errors.len(), 3);
        // the healthy line in between still made it in
        assert_eq!(config.rules().len(), 1);
        // and every error has a position to report
        assert!(errors.iter().all(|e| e.location.is_some()));
    }

    #[test]
    fn garbage_at_end_of_rule() {
        assert_eq!(error_count("permit alice frobnicate\n"), 1);
        assert_eq!(error_count("permit alice as root frobnicate\n"), 1);
        assert_eq!(error_count("permit alice { nope }\n"), 1);
    }

    #[test]
    fn setenv_requires_braces() {
        assert_eq!(error_count("permit setenv PATH alice\n"), 1);
        assert_eq!(error_count("permit setenv { PATH alice\n"), 1);
    }

    #[test]
    fn rules_survive_a_reparse_of_their_own_rendering() {
        let sources = [
            "permit alice\n",
            "deny :wheel as root\n",
            "permit nopass nolog keepenv 1000 as 0\n",
            "permit persist alice as bob cmd /bin/ls args -l /tmp\n",
            "permit setenv { PATH -MAIL EDITOR=vi MOTD=\"hi there\" FOO= } alice\n",
            "permit \"nopass\" as \"1000\" cmd \"args\" args \"\" \"a b\"\n",
            "permit :42 cmd reboot args\n",
        ];

        for source in sources {
            let original = parse_ok(source);
            let rendered: String = original
                .rules()
                .iter()
                .map(|rule| format!("{rule}\n"))
                .collect();
            let reparsed = parse_ok(&rendered);
            assert_eq!(original.rules(), reparsed.rules(), "via {rendered:?}");
        }
    }
}

mod matcher {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_rules_means_deny() {
        let config = parse_ok("");
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), None);
    }

    #[test]
    fn last_match_wins() {
        // a broad default with a narrowing override
        let config = parse_ok("deny alice as root\npermit alice\n");
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), Some(false));
        assert_eq!(verdict(&config, &alice(), &bob(), "id", &[]), Some(true));

        // and the mirror image
        let config = parse_ok("permit alice\ndeny alice as root\n");
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), Some(false));
    }

    #[test]
    fn prepending_non_matching_rules_changes_nothing() {
        let base = "permit alice as root\n";
        let noise = "deny bob\npermit :9999\ndeny charlie cmd /bin/ls\n";
        let plain = parse_ok(base);
        let noisy = parse_ok(&format!("{noise}{base}"));
        for (target, cmd) in [(root(), "id"), (bob(), "ls")] {
            assert_eq!(
                verdict(&plain, &alice(), &target, cmd, &[]),
                verdict(&noisy, &alice(), &target, cmd, &[])
            );
        }
    }

    #[test]
    fn unknown_names_never_match() {
        let config = parse_ok("permit charlie\npermit :nosuchgroup\n");
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), None);
    }

    #[test]
    fn group_membership() {
        let config = parse_ok("permit :wheel\n");
        // alice has wheel (gid 10) in her group set, bob does not
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), Some(true));
        assert_eq!(verdict(&config, &bob(), &root(), "id", &[]), None);

        // numeric group form
        let config = parse_ok("permit :10\n");
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), Some(true));
        assert_eq!(verdict(&config, &bob(), &root(), "id", &[]), None);
    }

    #[test]
    fn user_rules_do_not_match_by_group() {
        // "wheel" as a user identity is an unknown user, not a group
        let config = parse_ok("permit wheel\n");
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), None);
    }

    #[test]
    fn numeric_identity_matching() {
        let config = parse_ok("permit 1000\n");
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), Some(true));
        assert_eq!(verdict(&config, &bob(), &root(), "id", &[]), None);
    }

    #[test]
    fn target_matching() {
        let config = parse_ok("permit alice as bob\n");
        assert_eq!(verdict(&config, &alice(), &bob(), "id", &[]), Some(true));
        assert_eq!(verdict(&config, &alice(), &root(), "id", &[]), None);

        let config = parse_ok("permit alice as 1001\n");
        assert_eq!(verdict(&config, &alice(), &bob(), "id", &[]), Some(true));
    }

    #[test]
    fn command_must_match_byte_for_byte() {
        let config = parse_ok("permit alice cmd /bin/ls\n");
        assert_eq!(
            verdict(&config, &alice(), &root(), "/bin/ls", &[]),
            Some(true)
        );
        // unconstrained arguments
        assert_eq!(
            verdict(&config, &alice(), &root(), "/bin/ls", &["-l"]),
            Some(true)
        );
        // a bare name is not the same command
        assert_eq!(verdict(&config, &alice(), &root(), "ls", &[]), None);
    }

    #[test]
    fn argument_vectors_must_agree_exactly() {
        let config = parse_ok("permit keepenv alice cmd /bin/ls args -l\n");
        let yes = |args: &[&str]| verdict(&config, &alice(), &root(), "/bin/ls", args);
        assert_eq!(yes(&["-l"]), Some(true));
        assert_eq!(yes(&["-la"]), None);
        assert_eq!(yes(&[]), None);
        assert_eq!(yes(&["-l", "x"]), None);
    }

    #[test]
    fn empty_args_only_matches_bare_invocation() {
        let config = parse_ok("permit alice cmd /sbin/reboot args\n");
        assert_eq!(
            verdict(&config, &alice(), &root(), "/sbin/reboot", &[]),
            Some(true)
        );
        assert_eq!(
            verdict(&config, &alice(), &root(), "/sbin/reboot", &["-f"]),
            None
        );
    }

    #[test]
    fn the_matched_rule_carries_its_options() {
        let config = parse_ok("permit alice\npermit nopass keepenv alice cmd /usr/bin/id\n");
        let args: Vec<String> = vec![];
        let rule = check_permission(
            &config,
            &alice(),
            &Request {
                target: &root(),
                command: "/usr/bin/id",
                arguments: &args,
            },
        )
        .unwrap();
        assert!(rule.options.nopass && rule.options.keepenv);

        let rule = check_permission(
            &config,
            &alice(),
            &Request {
                target: &root(),
                command: "/bin/sh",
                arguments: &args,
            },
        )
        .unwrap();
        assert!(!rule.options.nopass);
    }
}
