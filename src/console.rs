//! Console styling for diagnostic output
//!
//! All diagnostic output (dispatch traces, the OK marker, log lines) goes to
//! stderr. Escape codes are only emitted when stderr is a terminal, so piped
//! output stays clean.

use std::io::IsTerminal;
use std::time::Duration;

/// ANSI color helpers — only emit escape codes when stderr is a terminal.
pub struct Style {
    color: bool,
}

impl Style {
    #[must_use]
    pub fn new() -> Self {
        Self {
            color: std::io::stderr().is_terminal(),
        }
    }

    fn style(&self, code: &str, s: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{s}\x1b[0m")
        } else {
            s.to_string()
        }
    }

    #[must_use]
    pub fn bold(&self, s: &str) -> String {
        self.style("1", s)
    }

    #[must_use]
    pub fn green(&self, s: &str) -> String {
        self.style("32", s)
    }

    #[must_use]
    pub fn red(&self, s: &str) -> String {
        self.style("31", s)
    }

    #[must_use]
    pub fn yellow(&self, s: &str) -> String {
        self.style("33", s)
    }

    #[must_use]
    pub fn blue(&self, s: &str) -> String {
        self.style("34", s)
    }

    #[must_use]
    pub fn magenta(&self, s: &str) -> String {
        self.style("35", s)
    }

    #[must_use]
    pub fn dim(&self, s: &str) -> String {
        self.style("2", s)
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let millis = d.subsec_millis();
    if total_secs < 60 {
        let tenths = millis / 100;
        format!("{total_secs}.{tenths}s")
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let tenths = millis / 100;
        format!("{mins}m {secs}.{tenths}s")
    }
}
