use super::basic_parser::*;
use super::tokens::*;
use crate::common::IdentString;
use crate::system::interface::{GID_MAX, UID_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Permit,
    Deny,
}

/// The flag-like options of a rule; duplicates are not an error, the last
/// occurrence simply wins (which for independent flags is a no-op).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub nopass: bool,
    pub nolog: bool,
    pub persist: bool,
    pub keepenv: bool,
}

/// Who a rule applies to; a leading `:` in the rule file selects the
/// group forms. Digits-only words are numeric ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    User(IdentString),
    UserId(libc::uid_t),
    Group(IdentString),
    GroupId(libc::gid_t),
}

/// The target user named after `as`.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    User(IdentString),
    UserId(libc::uid_t),
}

/// One entry of a `setenv { ... }` block.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvDirective {
    /// `NAME`: carry the invoker's value over, if the invoker has one
    Keep(String),
    /// `NAME=value`
    Set(String, String),
    /// `-NAME`
    Unset(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub action: Action,
    pub options: Options,
    pub envlist: Vec<EnvDirective>,
    pub identity: Identity,
    pub target: Option<Target>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
}

impl Rule {
    pub fn permits(&self) -> bool {
        self.action == Action::Permit
    }
}

/// One logical line of the rule file.
pub enum ConfigLine {
    Rule(Rule),
    /// an empty line, or one carrying only a comment
    Blank,
}

/// A word is either a bare token or a quoted string; quoting is how a name
/// that collides with a keyword of the language can still be written down.
pub struct Word {
    pub text: String,
    pub quoted: bool,
}

impl Word {
    fn keyword(&self) -> Option<&str> {
        if self.quoted {
            None
        } else {
            Some(&self.text)
        }
    }
}

impl Parse for Word {
    fn parse(stream: &mut CharStream) -> Parsed<Self> {
        if accept_if(|c| c == '"', stream).is_some() {
            let text = maybe(Quoted::parse(stream))?
                .map(|Quoted(s)| s)
                .unwrap_or_default();
            expect_syntax('"', stream)?;
            make(Word { text, quoted: true })
        } else {
            let Unquoted(text) = Unquoted::parse(stream)?;
            make(Word { text, quoted: false })
        }
    }
}

fn digits(word: &Word) -> Option<&str> {
    let text = &word.text;
    if !word.quoted && !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        Some(text)
    } else {
        None
    }
}

fn user_ident(word: Word, stream: &mut CharStream, pos: (usize, usize)) -> Parsed<Identity> {
    if let Some(text) = digits(&word) {
        match text.parse::<libc::uid_t>() {
            Ok(uid) if uid != UID_MAX => make(Identity::UserId(uid)),
            _ => unrecoverable!(pos = pos, stream, "invalid user id '{text}'"),
        }
    } else {
        match IdentString::new(word.text) {
            Ok(name) => make(Identity::User(name)),
            Err(err) => unrecoverable!(pos = pos, stream, "{err}"),
        }
    }
}

fn group_ident(word: Word, stream: &mut CharStream, pos: (usize, usize)) -> Parsed<Identity> {
    if let Some(text) = digits(&word) {
        match text.parse::<libc::gid_t>() {
            Ok(gid) if gid != GID_MAX => make(Identity::GroupId(gid)),
            _ => unrecoverable!(pos = pos, stream, "invalid group id '{text}'"),
        }
    } else {
        match IdentString::new(word.text) {
            Ok(name) => make(Identity::Group(name)),
            Err(err) => unrecoverable!(pos = pos, stream, "{err}"),
        }
    }
}

fn target_ident(word: Word, stream: &mut CharStream, pos: (usize, usize)) -> Parsed<Target> {
    if let Some(text) = digits(&word) {
        match text.parse::<libc::uid_t>() {
            Ok(uid) if uid != UID_MAX => make(Target::UserId(uid)),
            _ => unrecoverable!(pos = pos, stream, "invalid user id '{text}'"),
        }
    } else {
        match IdentString::new(word.text) {
            Ok(name) => make(Target::User(name)),
            Err(err) => unrecoverable!(pos = pos, stream, "{err}"),
        }
    }
}

/// grammar:
/// ```text
/// rule    := action options* identity ("as" target)?
///            ("cmd" command ("args" arg*)?)?
/// action  := "permit" | "deny"
/// option  := "nopass" | "nolog" | "persist" | "keepenv" | "setenv" "{" envspec* "}"
/// ```
impl Parse for ConfigLine {
    fn parse(stream: &mut CharStream) -> Parsed<ConfigLine> {
        // an empty line (or comment); parse_lines deals with the remainder
        let start_pos = stream.get_pos();
        let Some(word) = maybe(try_nonterminal::<Word>(stream))? else {
            return make(ConfigLine::Blank);
        };

        let action = match word.keyword() {
            Some("permit") => Action::Permit,
            Some("deny") => Action::Deny,
            _ => unrecoverable!(pos = start_pos, stream, "expected 'permit' or 'deny'"),
        };

        let mut options = Options::default();
        let mut envlist = Vec::new();

        let identity = loop {
            let item_pos = stream.get_pos();

            if accept_if(|c| c == ':', stream).is_some() {
                let Some(word) = maybe(try_nonterminal::<Word>(stream))? else {
                    unrecoverable!(pos = item_pos, stream, "expected group name")
                };
                break group_ident(word, stream, item_pos)?;
            }

            let Some(word) = maybe(try_nonterminal::<Word>(stream))? else {
                unrecoverable!(stream, "expected identity")
            };

            match word.keyword() {
                Some("nopass") => options.nopass = true,
                Some("nolog") => options.nolog = true,
                Some("keepenv") => options.keepenv = true,
                Some("persist") => {
                    if cfg!(feature = "timestamp") {
                        options.persist = true
                    } else {
                        unrecoverable!(
                            pos = item_pos,
                            stream,
                            "'persist' is not available: built without timestamp support"
                        )
                    }
                }
                Some("setenv") => {
                    expect_syntax('{', stream)?;
                    while let Some(directive) = maybe(try_nonterminal(stream))? {
                        envlist.push(directive);
                    }
                    expect_syntax('}', stream)?;
                }
                _ => break user_ident(word, stream, item_pos)?,
            }
        };

        if options.persist && action == Action::Deny {
            unrecoverable!(pos = start_pos, stream, "'persist' cannot be used with 'deny'");
        }

        let mut target = None;
        let mut command = None;
        let mut args = None;

        let mut lookahead = maybe(try_nonterminal::<Word>(stream))?;

        if lookahead.as_ref().and_then(Word::keyword) == Some("as") {
            let target_pos = stream.get_pos();
            let Some(word) = maybe(try_nonterminal::<Word>(stream))? else {
                unrecoverable!(stream, "expected user after 'as'")
            };
            target = Some(target_ident(word, stream, target_pos)?);
            lookahead = maybe(try_nonterminal::<Word>(stream))?;
        }

        if lookahead.as_ref().and_then(Word::keyword) == Some("cmd") {
            let Some(word) = maybe(try_nonterminal::<Word>(stream))? else {
                unrecoverable!(stream, "expected command after 'cmd'")
            };
            command = Some(word.text);
            lookahead = maybe(try_nonterminal::<Word>(stream))?;

            if lookahead.as_ref().and_then(Word::keyword) == Some("args") {
                let mut list = Vec::new();
                while let Some(Word { text, .. }) = maybe(try_nonterminal(stream))? {
                    list.push(text);
                }
                args = Some(list);
                lookahead = None;
            }
        }

        if lookahead.is_some() {
            unrecoverable!(stream, "expected 'as', 'cmd' or end of rule");
        }

        make(ConfigLine::Rule(Rule {
            action,
            options,
            envlist,
            identity,
            target,
            command,
            args,
        }))
    }
}

/// Write a word back out such that the parser reads the same word; quoting
/// protects anything that would be taken for a keyword, an id or syntax.
fn write_word(f: &mut std::fmt::Formatter, text: &str, name_position: bool) -> std::fmt::Result {
    const KEYWORDS: &[&str] = &[
        "permit", "deny", "nopass", "nolog", "persist", "keepenv", "setenv", "as", "cmd", "args",
    ];

    let bare_safe = !text.is_empty()
        && text.chars().all(|c| Unquoted::accept(c))
        && !KEYWORDS.contains(&text)
        && !(name_position && text.bytes().all(|b| b.is_ascii_digit()));

    if bare_safe {
        f.write_str(text)
    } else {
        write!(f, "\"")?;
        for c in text.chars() {
            if Quoted::escaped(c) {
                write!(f, "\\")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "\"")
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.action {
            Action::Permit => write!(f, "permit")?,
            Action::Deny => write!(f, "deny")?,
        }

        for (set, name) in [
            (self.options.nopass, "nopass"),
            (self.options.nolog, "nolog"),
            (self.options.persist, "persist"),
            (self.options.keepenv, "keepenv"),
        ] {
            if set {
                write!(f, " {name}")?;
            }
        }

        if !self.envlist.is_empty() {
            write!(f, " setenv {{")?;
            for directive in &self.envlist {
                match directive {
                    EnvDirective::Keep(name) => write!(f, " {name}")?,
                    EnvDirective::Set(name, value) => {
                        write!(f, " {name}=")?;
                        write_word(f, value, false)?;
                    }
                    EnvDirective::Unset(name) => write!(f, " -{name}")?,
                }
            }
            write!(f, " }}")?;
        }

        write!(f, " ")?;
        match &self.identity {
            Identity::User(name) => write_word(f, name, true)?,
            Identity::UserId(uid) => write!(f, "{uid}")?,
            Identity::Group(name) => {
                write!(f, ":")?;
                write_word(f, name, true)?;
            }
            Identity::GroupId(gid) => write!(f, ":{gid}")?,
        }

        if let Some(target) = &self.target {
            write!(f, " as ")?;
            match target {
                Target::User(name) => write_word(f, name, true)?,
                Target::UserId(uid) => write!(f, "{uid}")?,
            }
        }

        if let Some(command) = &self.command {
            write!(f, " cmd ")?;
            write_word(f, command, false)?;
            if let Some(args) = &self.args {
                write!(f, " args")?;
                for arg in args {
                    write!(f, " ")?;
                    write_word(f, arg, false)?;
                }
            }
        }

        Ok(())
    }
}

/// grammar:
/// ```text
/// envspec := NAME             ; preserve from invoker if set
///          | NAME "=" string  ; set to literal
///          | "-" NAME         ; explicitly drop
/// ```
impl Parse for EnvDirective {
    fn parse(stream: &mut CharStream) -> Parsed<Self> {
        if accept_if(|c| c == '-', stream).is_some() {
            let EnvName(name) = expect_nonterminal(stream)?;
            return make(EnvDirective::Unset(name));
        }

        let EnvName(name) = EnvName::parse(stream)?;

        if accept_if(|c| c == '=', stream).is_some() {
            if accept_if(|c| c == '"', stream).is_some() {
                let text = maybe(Quoted::parse(stream))?
                    .map(|Quoted(s)| s)
                    .unwrap_or_default();
                expect_syntax('"', stream)?;
                make(EnvDirective::Set(name, text))
            } else {
                let value = maybe(Unquoted::parse(stream))?
                    .map(|Unquoted(s)| s)
                    .unwrap_or_default();
                skip_trailing_whitespace(stream)?;
                make(EnvDirective::Set(name, value))
            }
        } else {
            skip_trailing_whitespace(stream)?;
            make(EnvDirective::Keep(name))
        }
    }
}
