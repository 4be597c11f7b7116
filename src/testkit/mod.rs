// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session state and teardown guards for integration tests.
//!
//! A [`Session`] carries what would otherwise be process-wide switches
//! (settings, the docker binary, whether to keep containers around) and is
//! passed by reference to setup code. Guards make sure observed resources go
//! away on every exit path, including a failed wait.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::io;
use std::ops::{Deref, DerefMut};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{
    ContainerStatus, ContainerWaitExt, DockerClient, DockerContainer, ProcessOutput,
};
use crate::config::{Settings, DEFAULT_STEP};
use crate::error::{Result, WaitError};

/// Environment variable that enables tests against a real docker daemon.
pub const ENV_DOCKER_TESTS: &str = "WAITKIT_DOCKER_TESTS";

/// Default budget of [`ProcessGuard::wait_for_child`].
pub const CHILD_SPAWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Session-scoped configuration and state.
#[derive(Debug, Clone)]
pub struct Session {
    settings: Settings,
    docker: DockerClient,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        let docker = DockerClient::from_settings(&settings);
        Self { settings, docker }
    }

    /// Build a session from the environment; see [`Settings::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Settings::from_env()?))
    }

    /// Whether docker-backed tests should run.
    /// Skips if `WAITKIT_DOCKER_TESTS` is not set.
    pub fn docker_tests_enabled() -> bool {
        std::env::var(ENV_DOCKER_TESTS).is_ok()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn docker(&self) -> &DockerClient {
        &self.docker
    }

    /// Take charge of an already started container.
    ///
    /// When `wait_status` is given, waits for it before returning; the guard
    /// is already armed at that point, so a container that never gets there
    /// is still stopped.
    pub async fn attach(
        &self,
        id: &str,
        wait_status: Option<ContainerStatus>,
    ) -> Result<ContainerGuard> {
        let container = DockerContainer::attach(self.docker.clone(), id).await?;
        let mut guard = ContainerGuard {
            container,
            keep: self.settings.keep_containers,
        };
        if let Some(status) = wait_status {
            guard.wait_for_status(status, self.settings.timeout).await?;
        }
        Ok(guard)
    }

    /// Spawn `command` with its combined output captured for matching.
    pub fn spawn_process(&self, command: Command) -> Result<ProcessGuard> {
        let mut guard = ProcessGuard::spawn(command)?;
        guard.output = guard.output.clone().with_strip_ansi(self.settings.strip_ansi);
        Ok(guard)
    }
}

/// Stops its container when dropped, unless the session keeps containers.
///
/// The container is not removed so that it can be inspected after a failure.
#[derive(Debug)]
pub struct ContainerGuard {
    container: DockerContainer,
    keep: bool,
}

impl ContainerGuard {
    pub fn new(container: DockerContainer, keep: bool) -> Self {
        Self { container, keep }
    }
}

impl Deref for ContainerGuard {
    type Target = DockerContainer;

    fn deref(&self) -> &DockerContainer {
        &self.container
    }
}

impl DerefMut for ContainerGuard {
    fn deref_mut(&mut self) -> &mut DockerContainer {
        &mut self.container
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let id = self.container.id().to_string();
        if self.keep {
            info!(container = %id, "keeping container");
            return;
        }
        info!(container = %id, "stopping container");
        if let Err(e) = self.container.client().stop_blocking(&id) {
            warn!(container = %id, error = %e, "failed to stop container");
        }
    }
}

/// A child process whose stdout and stderr go to one file.
///
/// The child is killed and reaped when the guard is dropped.
#[derive(Debug)]
pub struct ProcessGuard {
    child: Child,
    output: ProcessOutput,
    _dir: TempDir,
}

impl ProcessGuard {
    pub fn spawn(mut command: Command) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("waitkit-output").tempdir()?;
        let path = dir.path().join("output.txt");
        let stdout = File::create(&path)?;
        let stderr = stdout.try_clone()?;

        let child = command
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()?;
        info!(pid = child.id(), output = %path.display(), "spawned process");

        Ok(Self {
            child,
            output: ProcessOutput::new(path),
            _dir: dir,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }

    /// Exit status, if the process has already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// See [`ProcessOutput::wait_for_lines_fnmatch`].
    pub async fn wait_for_lines_fnmatch(
        &self,
        patterns: &[&str],
        settings: &Settings,
    ) -> Result<()> {
        self.output.wait_for_lines_fnmatch(patterns, settings).await
    }

    /// Pids of the direct children of the process. Reads `/proc`.
    pub fn children(&self) -> Result<Vec<u32>> {
        children_of(self.id())
    }

    /// Wait until the process has at least one child and return the pid of
    /// the first one.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Runtime`] if no child shows up within `timeout`.
    pub async fn wait_for_child(&self, timeout: Duration) -> Result<u32> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(&pid) = self.children()?.first() {
                debug!(pid = self.id(), child = pid, "child process found");
                return Ok(pid);
            }
            tokio::time::sleep(DEFAULT_STEP).await;
        }
        Err(WaitError::Runtime(format!(
            "No child process of {} found in {} seconds",
            self.id(),
            timeout.as_secs_f64()
        )))
    }

    /// Kill every direct child, leaving the process itself running.
    /// Returns how many were signalled.
    pub fn halt_children(&self) -> Result<usize> {
        let mut halted = 0;
        for pid in self.children()? {
            let Ok(raw) = i32::try_from(pid) else {
                continue;
            };
            match kill(Pid::from_raw(raw), Signal::SIGKILL) {
                Ok(()) => halted += 1,
                // already gone
                Err(Errno::ESRCH) => {}
                Err(e) => return Err(io::Error::from(e).into()),
            }
        }
        info!(pid = self.id(), halted, "halted child processes");
        Ok(halted)
    }
}

fn children_of(pid: u32) -> Result<Vec<u32>> {
    let mut children = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        let Some(candidate) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        // processes come and go while scanning
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if parent_pid(&stat) == Some(pid) {
            children.push(candidate);
        }
    }
    children.sort_unstable();
    Ok(children)
}

/// Parent pid from a `/proc/<pid>/stat` line: `pid (comm) state ppid ...`.
/// `comm` may contain spaces and parentheses.
fn parent_pid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!(pid = self.child.id(), error = %e, "failed to kill process");
        }
        if let Err(e) = self.child.wait() {
            warn!(pid = self.child.id(), error = %e, "failed to reap process");
        }
    }
}
