//! Names for parseable items, used for error messages.

pub trait UserFriendly {
    const DESCRIPTION: &'static str;
}

impl UserFriendly for super::tokens::EnvName {
    const DESCRIPTION: &'static str = "environment variable name";
}

impl UserFriendly for super::ast::Word {
    const DESCRIPTION: &'static str = "word";
}

impl UserFriendly for super::ast::EnvDirective {
    const DESCRIPTION: &'static str = "environment directive";
}

impl UserFriendly for super::ast::ConfigLine {
    const DESCRIPTION: &'static str = "rule"; // not actually used: rule lines parse 'softly'
}
