// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::Result;
use crate::resources::nocolor::decode_nocolor;
use crate::resources::LogMatcher;
use crate::runtime::{Refresh, Waiter};

/// Combined stdout/stderr of a process, captured in a file.
///
/// As a waiter source it needs no refresh: every attempt re-reads the file.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    path: PathBuf,
    strip_ansi: bool,
}

impl ProcessOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strip_ansi: false,
        }
    }

    #[must_use]
    pub fn with_strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current output, one entry per line. A file that does not exist yet
    /// reads as empty.
    pub async fn read_lines(&self) -> Result<Vec<String>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let text = if self.strip_ansi {
            decode_nocolor(&bytes)
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        Ok(text.lines().map(str::to_string).collect())
    }

    /// Snapshot the current output for matching.
    pub async fn matcher(&self) -> Result<LogMatcher> {
        Ok(LogMatcher::new(self.read_lines().await?))
    }

    pub fn waiter(&self, settings: &Settings) -> Waiter<ProcessOutput> {
        let source = self
            .clone()
            .with_strip_ansi(self.strip_ansi || settings.strip_ansi);
        Waiter::from_settings(source, settings)
    }

    /// Wait until the output contains `patterns`, in order.
    ///
    /// # Errors
    ///
    /// Returns the last mismatch when the budget runs out, or an I/O error
    /// if the output file cannot be read.
    pub async fn wait_for_lines_fnmatch(
        &self,
        patterns: &[&str],
        settings: &Settings,
    ) -> Result<()> {
        self.waiter(settings)
            .until(|matcher| async move { matcher.fnmatch_lines(patterns) })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Refresh for ProcessOutput {
    type Context = LogMatcher;

    async fn context(&mut self) -> Result<LogMatcher> {
        self.matcher().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let output = ProcessOutput::new(dir.path().join("not-yet.txt"));
        assert!(output.read_lines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_strip_ansi() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        tokio::fs::write(&path, "\x1b[32mready\x1b[0m\n").await.unwrap();

        let raw = ProcessOutput::new(&path);
        assert_ne!(raw.read_lines().await.unwrap(), vec!["ready"]);
        let clean = ProcessOutput::new(&path).with_strip_ansi(true);
        assert_eq!(clean.read_lines().await.unwrap(), vec!["ready"]);
    }

    #[tokio::test]
    async fn test_waits_for_late_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let output = ProcessOutput::new(&path);

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                tokio::fs::write(&path, "booting\nlistening on :8080\n").await.unwrap();
            })
        };

        let settings = Settings::default()
            .with_timeout(Duration::from_secs(5))
            .with_step(Duration::from_millis(20));
        output
            .wait_for_lines_fnmatch(&["booting", "listening on *"], &settings)
            .await
            .unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_reports_last_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        tokio::fs::write(&path, "booting\n").await.unwrap();

        let settings = Settings::default()
            .with_timeout(Duration::from_millis(200))
            .with_step(Duration::from_millis(20));
        let err = ProcessOutput::new(&path)
            .wait_for_lines_fnmatch(&["booting", "ready"], &settings)
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("'ready'"));
    }
}
