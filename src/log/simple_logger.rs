use std::fmt;
use std::io::Write;

use crate::log::{Level, Log};

pub struct SimpleLogger<W: Send + Sync>
where
    for<'a> &'a W: Write,
{
    target: W,
    prefix: &'static str,
}

impl<W: Send + Sync> Log for SimpleLogger<W>
where
    for<'a> &'a W: Write,
{
    fn log(&self, _level: Level, args: &fmt::Arguments<'_>) {
        let s = format!("{}{}\n", self.prefix, args);
        let _ = (&self.target).write_all(s.as_bytes());
        let _ = (&self.target).flush();
    }

    fn flush(&self) {}
}

impl SimpleLogger<std::io::Stderr> {
    pub fn to_stderr(prefix: &'static str) -> SimpleLogger<std::io::Stderr> {
        SimpleLogger {
            target: std::io::stderr(),
            prefix,
        }
    }
}
