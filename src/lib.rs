// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded polling for integration tests.
//!
//! Tests against containers and spawned processes keep asking the same
//! question: "is it there yet?". This crate answers it with a [`Waiter`]
//! that refreshes a source, hands out a fresh context per attempt and stops
//! on the first success, the first fatal error, or an exhausted budget, in
//! which case the last recoverable failure is returned.
//!
//! ```no_run
//! use waitkit::{ensure, poll_fn, Settings, Waiter};
//!
//! # async fn run() -> waitkit::Result<()> {
//! let settings = Settings::from_env()?;
//! let mut waiter = Waiter::from_settings(
//!     poll_fn(|| std::path::Path::new("/tmp/ready").exists()),
//!     &settings,
//! );
//! waiter
//!     .until(|ready| async move {
//!         ensure!(ready, "/tmp/ready not created yet");
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod resources;
pub mod runtime;
pub mod testkit;

pub use client::{
    ContainerHandle, ContainerLogs, ContainerPorts, ContainerStatus, ContainerWaitExt,
    DockerClient, DockerContainer, ProcessOutput,
};
pub use config::Settings;
pub use error::{Result, WaitError};
pub use resources::{LogMatcher, NetworkProbe, PortBindings};
pub use runtime::{poll_fn, wait_for_status, Attempt, EmptyBudget, Refresh, Waiter};
pub use testkit::{ContainerGuard, ProcessGuard, Session};
