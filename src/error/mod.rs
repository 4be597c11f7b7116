// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;
use thiserror::Error;

use crate::client::ContainerStatus;

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A check did not hold yet. Retried until the deadline.
    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// A check gave up explicitly. Retried until the deadline.
    #[error("Failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error(
        "Container {resource} ({last}) did not reach state {target} in {} seconds",
        .timeout.as_secs_f64()
    )]
    Timeout {
        resource: String,
        last: ContainerStatus,
        target: ContainerStatus,
        timeout: Duration,
    },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl WaitError {
    /// Build a soft assertion failure.
    pub fn assertion(msg: impl Into<String>) -> Self {
        WaitError::Assertion(msg.into())
    }

    /// Build an explicit, retryable test failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        WaitError::Failed(msg.into())
    }

    /// Whether a waiter may swallow this error and try again.
    ///
    /// Only assertion-style mismatches and explicit failures qualify; any
    /// other error aborts the wait immediately.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WaitError::Assertion(_) | WaitError::Failed(_))
    }
}

impl From<serde_json::Error> for WaitError {
    fn from(e: serde_json::Error) -> Self {
        WaitError::Runtime(format!("Failed to decode runtime output: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, WaitError>;

/// Return a soft [`WaitError::Assertion`] from the enclosing function unless
/// the condition holds.
///
/// ```
/// use waitkit::{ensure, Result};
///
/// fn check(ready: bool) -> Result<()> {
///     ensure!(ready, "service not ready");
///     Ok(())
/// }
///
/// assert!(check(true).is_ok());
/// assert!(check(false).unwrap_err().is_recoverable());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr $(,)?) => {
        if !$cond {
            return Err($crate::WaitError::Assertion(
                concat!("assertion failed: ", stringify!($cond)).to_string(),
            ));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::WaitError::Assertion(format!($($arg)+)));
        }
    };
}

/// Like [`ensure!`] for equality, reporting both sides on mismatch.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    return Err($crate::WaitError::Assertion(format!(
                        "`{}` == `{}` (left: {:?}, right: {:?})",
                        stringify!($left),
                        stringify!($right),
                        left,
                        right
                    )));
                }
            }
        }
    };
}
