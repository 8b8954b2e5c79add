use super::{DoasAction, DoasCheckOptions, DoasRunOptions};
use pretty_assertions::assert_eq;

fn parse(args: &[&str]) -> Result<DoasAction, String> {
    DoasAction::try_parse_from(std::iter::once("doas").chain(args.iter().copied()))
}

fn parse_run(args: &[&str]) -> DoasRunOptions {
    match parse(args) {
        Ok(DoasAction::Run(options)) => options,
        _ => panic!("expected a run action for {args:?}"),
    }
}

fn parse_check(args: &[&str]) -> DoasCheckOptions {
    match parse(args) {
        Ok(DoasAction::Check(options)) => options,
        _ => panic!("expected a check action for {args:?}"),
    }
}

#[test]
fn simple_command() {
    let options = parse_run(&["id"]);
    assert_eq!(options.positional_args, ["id"]);
    assert_eq!(options.user, None);
    assert!(!options.non_interactive);
    assert!(!options.shell);
}

#[test]
fn flags_of_the_command_are_left_alone() {
    let options = parse_run(&["ls", "-l", "/tmp"]);
    assert_eq!(options.positional_args, ["ls", "-l", "/tmp"]);

    let options = parse_run(&["-n", "ls", "-n"]);
    assert!(options.non_interactive);
    assert_eq!(options.positional_args, ["ls", "-n"]);
}

#[test]
fn double_dash_ends_the_options() {
    let options = parse_run(&["--", "-weird-command"]);
    assert_eq!(options.positional_args, ["-weird-command"]);
}

#[test]
fn target_user() {
    let options = parse_run(&["-u", "operator", "id"]);
    assert_eq!(options.user, Some("operator".into()));

    // the value may be glued to the flag
    let options = parse_run(&["-uoperator", "id"]);
    assert_eq!(options.user, Some("operator".into()));
}

#[test]
fn combined_flags() {
    let options = parse_run(&["-ns"]);
    assert!(options.non_interactive);
    assert!(options.shell);
    assert!(options.positional_args.is_empty());
}

#[test]
fn shell_without_command() {
    let options = parse_run(&["-s"]);
    assert!(options.shell);
}

#[test]
fn shell_with_command_is_an_error() {
    assert!(parse(&["-s", "id"]).is_err());
}

#[test]
fn no_command_is_an_error() {
    assert!(parse(&[]).is_err());
    assert!(parse(&["-n"]).is_err());
}

#[test]
fn unknown_flags_are_rejected() {
    assert!(parse(&["-x", "id"]).is_err());
    assert!(parse(&["-nx", "id"]).is_err());
}

#[test]
fn missing_values_are_rejected() {
    assert!(parse(&["-u"]).is_err());
    assert!(parse(&["id", "-C"]).is_ok()); // belongs to the command
    assert!(parse(&["-C"]).is_err());
}

#[test]
fn check_mode() {
    let options = parse_check(&["-C", "/etc/doas.conf"]);
    assert_eq!(options.config, std::path::PathBuf::from("/etc/doas.conf"));
    assert!(options.positional_args.is_empty());

    let options = parse_check(&["-C", "/etc/doas.conf", "-u", "operator", "id", "-u"]);
    assert_eq!(options.user, Some("operator".into()));
    assert_eq!(options.positional_args, ["id", "-u"]);
}

#[test]
fn check_mode_excludes_shell() {
    assert!(parse(&["-C", "/etc/doas.conf", "-s"]).is_err());
    assert!(parse(&["-s", "-C", "/etc/doas.conf"]).is_err());
}

#[test]
fn clearing_persisted_auth() {
    assert!(matches!(parse(&["-L"]), Ok(DoasAction::ClearPersist)));
    // -L wins over anything else on the line
    assert!(matches!(parse(&["-nL"]), Ok(DoasAction::ClearPersist)));
}

#[test]
fn a_lone_dash_is_a_command() {
    let options = parse_run(&["-"]);
    assert_eq!(options.positional_args, ["-"]);
}
