// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observed resources and the waiters bound to them.
//!
//! The crate never creates containers or processes; it only looks at them.
//! A container is anything implementing [`ContainerHandle`] (the Docker CLI
//! adapter in [`docker`] is one), a process is the file its combined output
//! is written to ([`ProcessOutput`]).
//!
//! # Example
//!
//! ```no_run
//! use waitkit::client::{ContainerWaitExt, DockerClient, DockerContainer};
//! use waitkit::config::Settings;
//!
//! # async fn run() -> waitkit::Result<()> {
//! let settings = Settings::from_env()?;
//! let docker = DockerClient::from_settings(&settings);
//! let mut lapi = DockerContainer::attach(docker, "crowdsec").await?;
//!
//! lapi.wait_for_log(&["*Starting processing data*"], &settings).await?;
//! let status = lapi.wait_for_http(8080, "/health", None, &settings).await?;
//! println!("LAPI answered {status:?}");
//! # Ok(())
//! # }
//! ```

pub mod docker;
mod process;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::Empty;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{Result, WaitError};
use crate::resources::nocolor::strip_ansi;
use crate::resources::{http_client, LogMatcher, NetworkProbe, PortBindings};
use crate::runtime::{self, Refresh, Waiter};

pub use docker::{ContainerState, DockerClient, DockerContainer};
pub use process::ProcessOutput;

/// Lifecycle state reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Removing,
    /// Any state this crate does not know by name.
    Other(String),
}

impl ContainerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            "removing" => ContainerStatus::Removing,
            other => ContainerStatus::Other(other.to_string()),
        }
    }
}

impl FromStr for ContainerStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ContainerStatus::from(s))
    }
}

/// A running container as seen by the polling core.
///
/// `status`, `ports` and `name` describe the state captured by the last
/// [`reload`](ContainerHandle::reload).
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Re-read state from the container runtime.
    async fn reload(&mut self) -> Result<()>;

    fn status(&self) -> ContainerStatus;

    /// The last `tail` lines of combined stdout/stderr.
    async fn log_lines(&self, tail: usize) -> Result<Vec<String>>;

    fn ports(&self) -> &PortBindings;
}

/// Waiter source: reload the container, then match its logs.
pub struct ContainerLogs<'a, C: ContainerHandle + ?Sized> {
    container: &'a mut C,
    tail: usize,
    strip_ansi: bool,
}

impl<'a, C: ContainerHandle + ?Sized> ContainerLogs<'a, C> {
    pub fn new(container: &'a mut C, settings: &Settings) -> Self {
        Self {
            container,
            tail: settings.log_tail,
            strip_ansi: settings.strip_ansi,
        }
    }
}

#[async_trait]
impl<'a, C: ContainerHandle + ?Sized> Refresh for ContainerLogs<'a, C> {
    type Context = LogMatcher;

    async fn refresh(&mut self) -> Result<()> {
        self.container.reload().await
    }

    async fn context(&mut self) -> Result<LogMatcher> {
        let lines = self.container.log_lines(self.tail).await?;
        if self.strip_ansi {
            Ok(LogMatcher::new(lines.iter().map(|l| strip_ansi(l).into_owned())))
        } else {
            Ok(LogMatcher::new(lines))
        }
    }
}

/// Waiter source: reload the container, then probe its published ports.
pub struct ContainerPorts<'a, C: ContainerHandle + ?Sized> {
    container: &'a mut C,
    host: String,
    timeout: Duration,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl<'a, C: ContainerHandle + ?Sized> ContainerPorts<'a, C> {
    pub fn new(container: &'a mut C, settings: &Settings) -> Self {
        Self {
            container,
            host: settings.probe_host.clone(),
            timeout: settings.http_timeout,
            client: http_client(settings.http_timeout),
        }
    }
}

#[async_trait]
impl<'a, C: ContainerHandle + ?Sized> Refresh for ContainerPorts<'a, C> {
    type Context = NetworkProbe;

    async fn refresh(&mut self) -> Result<()> {
        self.container.reload().await
    }

    async fn context(&mut self) -> Result<NetworkProbe> {
        Ok(NetworkProbe::with_client(
            self.container.ports().clone(),
            self.host.clone(),
            self.timeout,
            self.client.clone(),
        ))
    }
}

/// Convenience waits available on every [`ContainerHandle`].
#[async_trait]
pub trait ContainerWaitExt: ContainerHandle + Sized {
    /// A waiter whose attempts see the container's latest logs.
    fn log_waiter(&mut self, settings: &Settings) -> Waiter<ContainerLogs<'_, Self>> {
        Waiter::from_settings(ContainerLogs::new(self, settings), settings)
    }

    /// A waiter whose attempts probe the container's published ports.
    fn port_waiter(&mut self, settings: &Settings) -> Waiter<ContainerPorts<'_, Self>> {
        Waiter::from_settings(ContainerPorts::new(self, settings), settings)
    }

    /// A probe over the currently known port bindings.
    fn probe(&self, settings: &Settings) -> NetworkProbe {
        NetworkProbe::from_settings(self.ports().clone(), settings)
    }

    /// Wait until the logs contain `patterns`, in order.
    ///
    /// # Errors
    ///
    /// Returns the last mismatch if the patterns never all show up, or any
    /// runtime error raised while reloading the container.
    async fn wait_for_log(&mut self, patterns: &[&str], settings: &Settings) -> Result<()> {
        let mut waiter = self.log_waiter(settings);
        waiter
            .until(|matcher| async move { matcher.fnmatch_lines(patterns) })
            .await?;
        Ok(())
    }

    /// Wait until `port` answers HTTP on `path`, optionally with `want`.
    ///
    /// Returns the status of the first satisfying answer, or `None` if no
    /// attempt was made because the budget was zero.
    ///
    /// # Errors
    ///
    /// Returns the last mismatch (no answer, or a different status) when the
    /// budget runs out, and probe errors such as request timeouts at once.
    async fn wait_for_http(
        &mut self,
        port: u16,
        path: &str,
        want: Option<StatusCode>,
        settings: &Settings,
    ) -> Result<Option<StatusCode>> {
        let mut waiter = self.port_waiter(settings);
        waiter
            .until(|probe| async move {
                let status = probe.http_status_code(port, path).await?;
                let Some(status) = status else {
                    return Err(WaitError::assertion(format!(
                        "no HTTP answer on port {port}{path}"
                    )));
                };
                if let Some(want) = want {
                    crate::ensure!(
                        status == want,
                        "port {port}{path} answered {status}, want {want}"
                    );
                }
                Ok(status)
            })
            .await
    }

    /// Wait until the container reports `target`.
    ///
    /// # Errors
    ///
    /// See [`runtime::wait_for_status`].
    async fn wait_for_status(&mut self, target: ContainerStatus, timeout: Duration) -> Result<()> {
        runtime::wait_for_status(self, target, timeout).await
    }
}

impl<C: ContainerHandle> ContainerWaitExt for C {}

#[cfg(test)]
mod tests;
