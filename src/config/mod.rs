#![forbid(unsafe_code)]

//! The rule language: parsing a policy file into an ordered list of rules,
//! and resolving a request against them with last-match-wins semantics.

mod ast;
mod ast_names;
mod basic_parser;
mod char_stream;
mod tokens;

use std::fs::File;
use std::io;
use std::path::Path;

use crate::system::audit;
use crate::system::interface::{GroupId, UnixUser, UserId};

use ast::ConfigLine;
use basic_parser::{parse_lines, CharStream, Parsed, Status};

pub use ast::{Action, EnvDirective, Identity, Options, Rule, Target};
pub use basic_parser::Span;

/// A syntax error, with its position in the input if there is a meaningful
/// one. The parser recovers to the next line, so one pass reports them all.
pub struct Error {
    pub location: Option<Span>,
    pub message: String,
}

/// An ordered rule set; order is source order, and no rule is ever changed
/// after parsing.
#[derive(Default)]
pub struct Config {
    rules: Vec<Rule>,
}

impl Config {
    pub fn open(path: impl AsRef<Path>, check_perms: bool) -> io::Result<(Config, Vec<Error>)> {
        let source = if check_perms {
            audit::secure_open_config(path.as_ref())?
        } else {
            File::open(path)?
        };
        Self::read(source)
    }

    pub fn read<R: io::Read>(mut reader: R) -> io::Result<(Config, Vec<Error>)> {
        let mut buffer = String::new();
        reader.read_to_string(&mut buffer)?;
        Ok(analyze(parse_lines(&mut CharStream::new(&buffer))))
    }

    #[cfg(test)]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// What the invoker asks for: run `command` with exactly `arguments`, under
/// the identity of `target`.
pub struct Request<'a, User: UnixUser> {
    pub target: &'a User,
    pub command: &'a str,
    pub arguments: &'a [String],
}

/// Resolve a request against the rule set. Every rule is consulted in
/// order and the last one that matches decides; the rule itself is handed
/// back because the caller needs its options and envlist. No match at all
/// means deny.
pub fn check_permission<'c, I: UnixUser, T: UnixUser>(
    config: &'c Config,
    invoker: &I,
    request: &Request<T>,
) -> Option<&'c Rule> {
    let mut last_match = None;
    for rule in &config.rules {
        if rule_matches(rule, invoker, request) {
            last_match = Some(rule);
        }
    }
    last_match
}

fn rule_matches<I: UnixUser, T: UnixUser>(
    rule: &Rule,
    invoker: &I,
    request: &Request<T>,
) -> bool {
    if !match_identity(&rule.identity, invoker) {
        return false;
    }

    if let Some(target) = &rule.target {
        let matches = match target {
            Target::User(name) => request.target.has_name(name.as_cstr()),
            Target::UserId(uid) => request.target.has_uid(UserId::new(*uid)),
        };
        if !matches {
            return false;
        }
    }

    if let Some(command) = &rule.command {
        if command.as_bytes() != request.command.as_bytes() {
            return false;
        }
        // if arguments were given, they should match explicitly
        if let Some(args) = &rule.args {
            if args.as_slice() != request.arguments {
                return false;
            }
        }
    }

    true
}

/// An identity in user form must resolve to the invoker's uid; one in
/// group form must resolve to a gid in the invoker's group set. A name
/// that fails to resolve simply does not match.
fn match_identity<User: UnixUser>(identity: &Identity, invoker: &User) -> bool {
    match identity {
        Identity::User(name) => invoker.has_name(name.as_cstr()),
        Identity::UserId(uid) => invoker.has_uid(UserId::new(*uid)),
        Identity::Group(name) => invoker.in_group_by_name(name.as_cstr()),
        Identity::GroupId(gid) => invoker.in_group_by_gid(GroupId::new(*gid)),
    }
}

/// Fold the parsed lines into a rule set, collecting the errors.
fn analyze(lines: impl IntoIterator<Item = Parsed<ConfigLine>>) -> (Config, Vec<Error>) {
    let mut config = Config::default();
    let mut diagnostics = Vec::new();

    for item in lines {
        match item {
            Ok(ConfigLine::Rule(rule)) => config.rules.push(rule),
            Ok(ConfigLine::Blank) => {}
            Err(Status::Fatal(pos, message)) => diagnostics.push(Error {
                location: Some(pos),
                message,
            }),
            Err(Status::Reject) => panic!("internal parser error"),
        }
    }

    (config, diagnostics)
}

#[cfg(test)]
mod test;
