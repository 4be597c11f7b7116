// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ContainerHandle`] backed by the `docker` command line.
//!
//! Only read-only commands (`inspect`, `logs`) are used while polling;
//! `stop` is reserved for teardown guards.

use async_trait::async_trait;
use serde::Deserialize;
use std::io::SeekFrom;
use std::process::{Output, Stdio};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tracing::{debug, trace};

use super::{ContainerHandle, ContainerStatus};
use crate::config::Settings;
use crate::error::{Result, WaitError};
use crate::resources::PortBindings;

/// State of a container captured by one `docker inspect`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
    pub ports: PortBindings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    name: String,
    state: InspectState,
    #[serde(default)]
    network_settings: Option<InspectNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(default)]
    ports: Option<PortBindings>,
}

impl ContainerState {
    /// Parse the JSON array printed by `docker inspect <id>`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Runtime`] if the output is not valid inspect JSON
    /// or holds no container.
    pub fn from_inspect_json(json: &[u8]) -> Result<Self> {
        let entries: Vec<InspectEntry> = serde_json::from_slice(json)?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| WaitError::Runtime("docker inspect returned no container".into()))?;

        Ok(Self {
            id: entry.id,
            name: entry.name.trim_start_matches('/').to_string(),
            status: ContainerStatus::from(entry.state.status.as_str()),
            ports: entry
                .network_settings
                .and_then(|n| n.ports)
                .unwrap_or_default(),
        })
    }
}

/// Thin wrapper over the docker executable.
#[derive(Debug, Clone)]
pub struct DockerClient {
    bin: String,
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerClient {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.docker_bin.clone())
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        trace!(bin = %self.bin, ?args, "running docker");
        let output = Command::new(&self.bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(WaitError::Runtime(format!(
                "{} {} failed ({}): {}",
                self.bin,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// Capture the current state of container `id`.
    pub async fn inspect(&self, id: &str) -> Result<ContainerState> {
        let output = self.run(&["inspect", "--type", "container", id]).await?;
        ContainerState::from_inspect_json(&output.stdout)
    }

    /// The last `tail` log lines of container `id`, in the order the
    /// container wrote them.
    ///
    /// `docker logs` replays the container's stdout and stderr on its own
    /// stdout and stderr, so both are pointed at one file.
    pub async fn logs(&self, id: &str, tail: usize) -> Result<Vec<String>> {
        let tail = tail.to_string();
        let output = self.run_combined(&["logs", "--tail", &tail, id]).await?;
        Ok(String::from_utf8_lossy(&output)
            .lines()
            .map(str::to_string)
            .collect())
    }

    async fn run_combined(&self, args: &[&str]) -> Result<Vec<u8>> {
        trace!(bin = %self.bin, ?args, "running docker with combined output");
        let sink = tempfile::tempfile()?;
        let status = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(sink.try_clone()?))
            .stderr(Stdio::from(sink.try_clone()?))
            .kill_on_drop(true)
            .status()
            .await?;

        let mut sink = tokio::fs::File::from_std(sink);
        sink.seek(SeekFrom::Start(0)).await?;
        let mut output = Vec::new();
        sink.read_to_end(&mut output).await?;

        if !status.success() {
            return Err(WaitError::Runtime(format!(
                "{} {} failed ({}): {}",
                self.bin,
                args.join(" "),
                status,
                String::from_utf8_lossy(&output).trim()
            )));
        }
        Ok(output)
    }

    /// Stop container `id` immediately. Blocking, for use in `Drop`.
    pub fn stop_blocking(&self, id: &str) -> Result<()> {
        let status = std::process::Command::new(&self.bin)
            .args(["stop", "--time", "0", id])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(WaitError::Runtime(format!(
                "{} stop {id} failed ({status})",
                self.bin
            )));
        }
        Ok(())
    }
}

/// A container observed through [`DockerClient`].
#[derive(Debug, Clone)]
pub struct DockerContainer {
    client: DockerClient,
    id: String,
    state: ContainerState,
}

impl DockerContainer {
    /// Start observing the existing container `id` (name or id).
    ///
    /// # Errors
    ///
    /// Fails if the container cannot be inspected.
    pub async fn attach(client: DockerClient, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let state = client.inspect(&id).await?;
        debug!(container = %state.name, status = %state.status, "attached to container");
        Ok(Self { client, id, state })
    }

    /// Identifier used for docker commands, as passed to [`attach`](Self::attach).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &ContainerState {
        &self.state
    }

    pub fn client(&self) -> &DockerClient {
        &self.client
    }
}

#[async_trait]
impl ContainerHandle for DockerContainer {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn reload(&mut self) -> Result<()> {
        self.state = self.client.inspect(&self.id).await?;
        Ok(())
    }

    fn status(&self) -> ContainerStatus {
        self.state.status.clone()
    }

    async fn log_lines(&self, tail: usize) -> Result<Vec<String>> {
        self.client.logs(&self.id, tail).await
    }

    fn ports(&self) -> &PortBindings {
        &self.state.ports
    }
}
