//! The scheduler-facing status channel.
//!
//! During a job invocation standard error carries line-oriented
//! `KEYWORD: message` updates that the print subsystem surfaces in its
//! queue UI. Standard output stays untouched (it belongs to discovery
//! mode). Write failures are swallowed: losing a status line must never
//! fail an otherwise healthy job.

use std::fmt::Display;
use std::io::{self, Write};

pub struct StatusChannel<W: Write> {
    out: W,
}

impl StatusChannel<io::Stderr> {
    pub fn stderr() -> Self {
        Self { out: io::stderr() }
    }
}

impl<W: Write> StatusChannel<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn info(&mut self, message: impl Display) {
        self.line("INFO", message);
    }

    pub fn warning(&mut self, message: impl Display) {
        self.line("WARNING", message);
    }

    pub fn error(&mut self, message: impl Display) {
        self.line("ERROR", message);
    }

    pub fn debug(&mut self, message: impl Display) {
        self.line("DEBUG", message);
    }

    pub fn state(&mut self, message: impl Display) {
        self.line("STATE", message);
    }

    fn line(&mut self, keyword: &str, message: impl Display) {
        let _ = writeln!(self.out, "{}: {}", keyword, message);
        let _ = self.out.flush();
    }

    /// Consumes the channel, returning the underlying writer. Used by tests
    /// to inspect captured output.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_keyword_prefixed_and_newline_terminated() {
        let mut status = StatusChannel::new(Vec::new());
        status.info("Spooling job 7");
        status.error("Conversion failed");
        let text = String::from_utf8(status.into_inner()).unwrap();
        assert_eq!(text, "INFO: Spooling job 7\nERROR: Conversion failed\n");
    }

    #[test]
    fn test_all_keywords() {
        let mut status = StatusChannel::new(Vec::new());
        status.warning("w");
        status.debug("d");
        status.state("+connecting-to-device");
        let text = String::from_utf8(status.into_inner()).unwrap();
        assert_eq!(text, "WARNING: w\nDEBUG: d\nSTATE: +connecting-to-device\n");
    }
}
