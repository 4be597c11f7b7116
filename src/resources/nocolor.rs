// SPDX-License-Identifier: MIT OR Apache-2.0

//! ANSI escape stripping for captured output.
//!
//! Only covers the single-character and CSI sequences that colored loggers
//! emit; it is not a terminal emulator.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static CONTROL_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("static pattern is valid")
});

/// Remove ANSI escape sequences from `s`.
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    CONTROL_SEQUENCE.replace_all(s, "")
}

/// Decode UTF-8 bytes lossily and remove ANSI escape sequences.
pub fn decode_nocolor(bytes: &[u8]) -> String {
    strip_ansi(&String::from_utf8_lossy(bytes)).into_owned()
}
