// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshots that checks inspect.
//!
//! Each attempt of a waiter builds one of these from freshly refreshed state
//! and throws it away afterwards.

mod log_matcher;
pub mod nocolor;
mod probe;

pub use log_matcher::LogMatcher;
pub use probe::{http_client, NetworkProbe, PortBinding, PortBindings};
