// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered pattern matching over captured output lines.
//!
//! # Example
//!
//! ```
//! use waitkit::resources::LogMatcher;
//!
//! let matcher = LogMatcher::new(vec!["Ax", "mid", "By"]);
//! assert!(matcher.fnmatch_lines(&["A*", "B*"]).is_ok());
//!
//! let matcher = LogMatcher::new(vec!["By", "Ax"]);
//! assert!(matcher.fnmatch_lines(&["A*", "B*"]).unwrap_err().is_recoverable());
//! ```

use glob::Pattern;
use regex::Regex;
use std::fmt;

use super::nocolor::strip_ansi;
use crate::error::{Result, WaitError};

/// Snapshot of output lines with glob and regex assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogMatcher {
    lines: Vec<String>,
}

impl LogMatcher {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Split `text` into lines.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines())
    }

    /// Split `text` into lines after removing ANSI escape sequences.
    pub fn from_text_nocolor(text: &str) -> Self {
        Self::from_text(&strip_ansi(text))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// All lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Check that every pattern matches some line, in order.
    ///
    /// Lines between matches are skipped. A line matches a pattern when it is
    /// equal to it or matches it as a glob (`*`, `?`, `[seq]`, `[!seq]`).
    ///
    /// # Errors
    ///
    /// Returns a soft [`WaitError::Assertion`] naming the first pattern that
    /// could not be found after the previous match.
    pub fn fnmatch_lines<S: AsRef<str>>(&self, patterns: &[S]) -> Result<()> {
        let mut pos = 0;
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = compile_glob(pattern);
            pos = self.find_from(pos, pattern, "fnmatch", |line| {
                line == pattern || glob.matches(line)
            })?;
        }
        Ok(())
    }

    /// Check that every regex matches the start of some line, in order.
    ///
    /// # Errors
    ///
    /// Returns a soft [`WaitError::Assertion`] on mismatch and a fatal
    /// [`WaitError::Pattern`] if a pattern is not a valid regex.
    pub fn re_match_lines<S: AsRef<str>>(&self, patterns: &[S]) -> Result<()> {
        let regexes = patterns
            .iter()
            .map(|p| compile_regex(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let mut pos = 0;
        for (pattern, re) in patterns.iter().zip(&regexes) {
            pos = self.find_from(pos, pattern.as_ref(), "re.match", |line| re.is_match(line))?;
        }
        Ok(())
    }

    /// Check that no line matches the glob `pattern`.
    ///
    /// # Errors
    ///
    /// Returns a soft [`WaitError::Assertion`] naming the offending line.
    pub fn no_fnmatch_line(&self, pattern: &str) -> Result<()> {
        let glob = compile_glob(pattern);
        self.forbid(pattern, "fnmatch", |line| line == pattern || glob.matches(line))
    }

    /// Check that no line starts with a match of the regex `pattern`.
    ///
    /// # Errors
    ///
    /// As [`no_fnmatch_line`](Self::no_fnmatch_line), plus a fatal
    /// [`WaitError::Pattern`] if the regex is invalid.
    pub fn no_re_match_line(&self, pattern: &str) -> Result<()> {
        let re = compile_regex(pattern)?;
        self.forbid(pattern, "re.match", |line| re.is_match(line))
    }

    /// Index just past the first line at or after `pos` accepted by `is_match`.
    fn find_from<F>(&self, pos: usize, pattern: &str, kind: &str, is_match: F) -> Result<usize>
    where
        F: Fn(&str) -> bool,
    {
        let rest = &self.lines[pos.min(self.lines.len())..];
        match rest.iter().position(|line| is_match(line.as_str())) {
            Some(offset) => Ok(pos + offset + 1),
            None => Err(WaitError::Assertion(mismatch(kind, pattern, rest))),
        }
    }

    fn forbid<F>(&self, pattern: &str, kind: &str, is_match: F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        match self.lines.iter().find(|line| is_match(line.as_str())) {
            Some(line) => Err(WaitError::Assertion(format!(
                "{kind}: '{pattern}' unexpectedly matched line '{line}'"
            ))),
            None => Ok(()),
        }
    }
}

impl fmt::Display for LogMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Compile a glob, falling back to a literal match for malformed patterns
/// such as an unclosed `[`.
///
/// Runs of `*` collapse into one: `glob` gives `**` a directory meaning,
/// while for line matching it is the same as `*`.
fn compile_glob(pattern: &str) -> Pattern {
    let collapsed = collapse_stars(pattern);
    Pattern::new(&collapsed).unwrap_or_else(|_| {
        Pattern::new(&Pattern::escape(pattern)).unwrap_or_default()
    })
}

fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut prev_star = false;
    for c in pattern.chars() {
        if c == '*' && prev_star {
            continue;
        }
        prev_star = c == '*';
        out.push(c);
    }
    out
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})"))
        .map_err(|e| WaitError::Pattern(format!("invalid regex '{pattern}': {e}")))
}

const MAX_REPORTED_LINES: usize = 50;

fn mismatch(kind: &str, pattern: &str, searched: &[String]) -> String {
    let mut msg = format!("no {kind} match for '{pattern}'");
    if searched.is_empty() {
        msg.push_str(" (no lines left to search)");
        return msg;
    }
    let skipped = searched.len().saturating_sub(MAX_REPORTED_LINES);
    msg.push_str(&format!(" in {} line(s):", searched.len()));
    if skipped > 0 {
        msg.push_str(&format!("\n  ... {skipped} earlier line(s)"));
    }
    for line in &searched[skipped..] {
        msg.push_str("\n  ");
        msg.push_str(line);
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_subsequence() {
        let matcher = LogMatcher::new(vec!["Ax", "mid", "By"]);
        assert!(matcher.fnmatch_lines(&["A*", "B*"]).is_ok());
    }

    #[test]
    fn test_out_of_order_fails_softly() {
        let matcher = LogMatcher::new(vec!["By", "Ax"]);
        let err = matcher.fnmatch_lines(&["A*", "B*"]).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("'B*'"));
    }

    #[test]
    fn test_each_line_consumed_once() {
        let matcher = LogMatcher::new(vec!["ready"]);
        assert!(matcher.fnmatch_lines(&["ready"]).is_ok());
        assert!(matcher.fnmatch_lines(&["ready", "ready"]).is_err());
    }

    #[test]
    fn test_glob_features() {
        let matcher = LogMatcher::from_text("level=info msg=\"listening on :8080\"\nworker 7 up\n");
        assert!(matcher
            .fnmatch_lines(&["*listening on :80?0*", "worker [0-9] up"])
            .is_ok());
        assert!(matcher.fnmatch_lines(&["worker [!7] up"]).is_err());
    }

    #[test]
    fn test_double_star() {
        let matcher = LogMatcher::new(vec!["fooXbar", "a/b", "a/x/y/b"]);
        assert!(matcher.fnmatch_lines(&["foo**bar"]).is_ok());
        assert!(matcher.fnmatch_lines(&["***"]).is_ok());
        assert!(matcher.fnmatch_lines(&["a/**/b"]).is_ok());
        // the separator is literal: `a/b` has nothing between two slashes
        let matcher = LogMatcher::new(vec!["a/b"]);
        assert!(matcher.fnmatch_lines(&["a/**/b"]).is_err());
    }

    #[test]
    fn test_brackets_fall_back_to_literal() {
        let matcher = LogMatcher::new(vec!["config [default"]);
        assert!(matcher.fnmatch_lines(&["config [default"]).is_ok());
    }

    #[test]
    fn test_empty_inputs() {
        let empty = LogMatcher::default();
        assert!(empty.fnmatch_lines::<&str>(&[]).is_ok());
        let err = empty.fnmatch_lines(&["anything"]).unwrap_err();
        assert!(err.to_string().contains("no lines left"));
    }

    #[test]
    fn test_re_match_lines() {
        let matcher = LogMatcher::new(vec![
            "time=1 starting",
            "time=2 listening on 127.0.0.1:6060",
        ]);
        assert!(matcher.re_match_lines(&[r"time=\d+ start", r".*:6060$"]).is_ok());
        // anchored at line start
        assert!(matcher.re_match_lines(&["starting"]).is_err());
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let matcher = LogMatcher::new(vec!["x"]);
        let err = matcher.re_match_lines(&["(unclosed"]).unwrap_err();
        assert!(matches!(err, WaitError::Pattern(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_no_match_lines() {
        let matcher = LogMatcher::new(vec!["INFO ok", "WARN slow"]);
        assert!(matcher.no_fnmatch_line("ERROR*").is_ok());
        let err = matcher.no_fnmatch_line("WARN*").unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("WARN slow"));

        assert!(matcher.no_re_match_line("ERR").is_ok());
        assert!(matcher.no_re_match_line("INFO").is_err());
    }

    #[test]
    fn test_nocolor_constructor() {
        let matcher = LogMatcher::from_text_nocolor("\x1b[32mINFO\x1b[0m ready\n");
        assert_eq!(matcher.lines(), ["INFO ready"]);
    }

    #[test]
    fn test_mismatch_report_is_bounded() {
        let lines: Vec<String> = (0..120).map(|i| format!("line {i}")).collect();
        let matcher = LogMatcher::new(lines);
        let msg = matcher.fnmatch_lines(&["missing"]).unwrap_err().to_string();
        assert!(msg.contains("in 120 line(s)"));
        assert!(msg.contains("70 earlier line(s)"));
        assert!(msg.contains("line 119"));
        assert!(!msg.contains("line 69\n"));
    }
}
