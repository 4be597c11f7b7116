// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polling runtime.
//!
//! [`Waiter`] is the generic bounded retry engine; [`wait_for_status`] is
//! the narrower status poll that shares its timing.

mod status;
mod waiter;

pub use status::{wait_for_status, wait_for_status_with_step};
pub use waiter::{poll_fn, Attempt, EmptyBudget, PollFn, Refresh, Waiter};
