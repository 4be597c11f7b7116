// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wait settings and their sources.
//!
//! Values are resolved in this order, highest precedence first:
//!
//! 1. explicit builder calls (`with_timeout`, `with_step`, ...)
//! 2. environment overrides (`WAITKIT_TIMEOUT`, `WAITKIT_KEEP_CONTAINERS`,
//!    `WAITKIT_DOCKER`)
//! 3. the YAML settings file named by `WAITKIT_CONFIG`
//! 4. built-in defaults
//!
//! # Example
//!
//! ```
//! use waitkit::config::Settings;
//! use std::time::Duration;
//!
//! let settings = Settings::from_yaml("timeout: 5\nlog_tail: 200\n")
//!     .unwrap()
//!     .with_step(Duration::from_millis(250));
//!
//! assert_eq!(settings.timeout, Duration::from_secs(5));
//! assert_eq!(settings.log_tail, 200);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WaitError};

/// Environment variable holding the default wait budget, in seconds.
pub const ENV_TIMEOUT: &str = "WAITKIT_TIMEOUT";
/// Environment variable naming a YAML settings file.
pub const ENV_CONFIG: &str = "WAITKIT_CONFIG";
/// Environment variable that keeps containers alive after a test.
pub const ENV_KEEP_CONTAINERS: &str = "WAITKIT_KEEP_CONTAINERS";
/// Environment variable overriding the docker binary.
pub const ENV_DOCKER: &str = "WAITKIT_DOCKER";

/// Default wait budget when nothing overrides it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
/// Default pause between two attempts.
pub const DEFAULT_STEP: Duration = Duration::from_millis(100);
/// Default number of trailing log lines fetched per attempt.
pub const DEFAULT_LOG_TAIL: usize = 10_000;
/// Default timeout of a single HTTP probe.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved settings shared by every wait in a test session.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Total budget of a single wait call.
    pub timeout: Duration,
    /// Pause between attempts.
    pub step: Duration,
    /// How many trailing container log lines each attempt looks at.
    pub log_tail: usize,
    /// Timeout of a single HTTP probe request.
    pub http_timeout: Duration,
    /// Host used to reach published ports.
    pub probe_host: String,
    /// Docker executable.
    pub docker_bin: String,
    /// Leave containers running when their guard is dropped.
    pub keep_containers: bool,
    /// Strip ANSI escape sequences from captured output before matching.
    pub strip_ansi: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            step: DEFAULT_STEP,
            log_tail: DEFAULT_LOG_TAIL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            probe_host: "localhost".to_string(),
            docker_bin: "docker".to_string(),
            keep_containers: false,
            strip_ansi: false,
        }
    }
}

/// On-disk shape of the settings file. Durations are seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_containers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_ansi: Option<bool>,
}

impl Settings {
    /// Create settings with built-in defaults only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML settings file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or a duration is invalid.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: SettingsFile = serde_yaml::from_str(yaml)
            .map_err(|e| WaitError::Config(format!("Failed to parse settings YAML: {e}")))?;
        Self::default().merge_file(file)
    }

    /// Load a YAML settings file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            WaitError::Config(format!(
                "Failed to read settings file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Resolve settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `WAITKIT_CONFIG` names an unreadable file or an
    /// override cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Settings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup(ENV_CONFIG) {
            Some(path) if !path.is_empty() => Self::load_from_path(path)?,
            _ => Self::default(),
        };

        if let Some(raw) = lookup(ENV_TIMEOUT) {
            settings.timeout = parse_timeout(&raw)?;
        }
        if let Some(raw) = lookup(ENV_KEEP_CONTAINERS) {
            settings.keep_containers = parse_flag(ENV_KEEP_CONTAINERS, &raw)?;
        }
        if let Some(bin) = lookup(ENV_DOCKER).filter(|b| !b.is_empty()) {
            settings.docker_bin = bin;
        }

        Ok(settings)
    }

    /// The default wait budget: `WAITKIT_TIMEOUT` or 20 seconds.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Config`] if the variable is not a number.
    pub fn default_timeout() -> Result<Duration> {
        match std::env::var(ENV_TIMEOUT) {
            Ok(raw) => parse_timeout(&raw),
            Err(_) => Ok(DEFAULT_TIMEOUT),
        }
    }

    fn merge_file(mut self, file: SettingsFile) -> Result<Self> {
        if let Some(secs) = file.timeout {
            self.timeout = seconds("timeout", secs)?;
        }
        if let Some(secs) = file.step {
            self.step = seconds("step", secs)?;
        }
        if let Some(tail) = file.log_tail {
            self.log_tail = tail;
        }
        if let Some(secs) = file.http_timeout {
            self.http_timeout = seconds("http_timeout", secs)?;
        }
        if let Some(host) = file.probe_host {
            self.probe_host = host;
        }
        if let Some(docker) = file.docker {
            self.docker_bin = docker;
        }
        if let Some(keep) = file.keep_containers {
            self.keep_containers = keep;
        }
        if let Some(strip) = file.strip_ansi {
            self.strip_ansi = strip;
        }
        Ok(self)
    }

    /// Set the total budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pause between attempts.
    #[must_use]
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Set how many trailing log lines are inspected.
    #[must_use]
    pub fn with_log_tail(mut self, tail: usize) -> Self {
        self.log_tail = tail;
        self
    }

    /// Set the per-request HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the host used to reach published ports.
    #[must_use]
    pub fn with_probe_host(mut self, host: impl Into<String>) -> Self {
        self.probe_host = host.into();
        self
    }

    /// Set the docker executable.
    #[must_use]
    pub fn with_docker_bin(mut self, bin: impl Into<String>) -> Self {
        self.docker_bin = bin.into();
        self
    }

    /// Keep or stop containers when their guard goes away.
    #[must_use]
    pub fn with_keep_containers(mut self, keep: bool) -> Self {
        self.keep_containers = keep;
        self
    }

    /// Enable or disable ANSI stripping of captured output.
    #[must_use]
    pub fn with_strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }
}

/// Parse a `WAITKIT_TIMEOUT` value. Non-positive values become a zero budget.
fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs: f64 = raw.trim().parse().map_err(|_| {
        WaitError::Config(format!(
            "Invalid {ENV_TIMEOUT} ({raw}): must be an integer or float"
        ))
    })?;
    seconds(ENV_TIMEOUT, secs)
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    if secs.is_nan() || secs.is_infinite() {
        return Err(WaitError::Config(format!(
            "Invalid {name} ({secs}): must be a finite number of seconds"
        )));
    }
    if secs <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| WaitError::Config(format!("Invalid {name} ({secs}): {e}")))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(WaitError::Config(format!(
            "Invalid {name} ({other}): expected a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.timeout, Duration::from_secs(20));
        assert_eq!(settings.step, Duration::from_millis(100));
        assert_eq!(settings.log_tail, 10_000);
        assert_eq!(settings.probe_host, "localhost");
        assert!(!settings.keep_containers);
    }

    #[test]
    fn test_timeout_override() {
        let settings = Settings::from_lookup(lookup(&[(ENV_TIMEOUT, "2.5")])).unwrap();
        assert_eq!(settings.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = Settings::from_lookup(lookup(&[(ENV_TIMEOUT, "soon")])).unwrap_err();
        match err {
            WaitError::Config(msg) => {
                assert!(msg.contains("WAITKIT_TIMEOUT (soon)"));
                assert!(msg.contains("integer or float"));
            }
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_positive_timeout_is_zero_budget() {
        let settings = Settings::from_lookup(lookup(&[(ENV_TIMEOUT, "-3")])).unwrap();
        assert_eq!(settings.timeout, Duration::ZERO);
    }

    #[test]
    fn test_keep_containers_flag() {
        let settings = Settings::from_lookup(lookup(&[(ENV_KEEP_CONTAINERS, "true")])).unwrap();
        assert!(settings.keep_containers);

        let err = Settings::from_lookup(lookup(&[(ENV_KEEP_CONTAINERS, "maybe")])).unwrap_err();
        assert!(matches!(err, WaitError::Config(_)));
    }

    #[test]
    fn test_from_yaml() {
        let settings = Settings::from_yaml(
            r#"
timeout: 3
step: 0.05
log_tail: 50
http_timeout: 1.5
probe_host: 127.0.0.1
strip_ansi: true
"#,
        )
        .unwrap();

        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert_eq!(settings.step, Duration::from_millis(50));
        assert_eq!(settings.log_tail, 50);
        assert_eq!(settings.http_timeout, Duration::from_millis(1500));
        assert_eq!(settings.probe_host, "127.0.0.1");
        assert!(settings.strip_ansi);
        assert_eq!(settings.docker_bin, "docker");
    }

    #[test]
    fn test_unknown_yaml_field() {
        let err = Settings::from_yaml("timeout: 1\nretries: 4\n").unwrap_err();
        assert!(matches!(err, WaitError::Config(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout: 3\ndocker: podman\nkeep_containers: true").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let settings = Settings::from_lookup(lookup(&[
            (ENV_CONFIG, path.as_str()),
            (ENV_TIMEOUT, "7"),
        ]))
        .unwrap();

        assert_eq!(settings.timeout, Duration::from_secs(7));
        assert_eq!(settings.docker_bin, "podman");
        assert!(settings.keep_containers);
    }

    #[test]
    fn test_explicit_value_wins() {
        let settings = Settings::from_lookup(lookup(&[(ENV_TIMEOUT, "7")]))
            .unwrap()
            .with_timeout(Duration::from_secs(1));
        assert_eq!(settings.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_settings_file() {
        let err = Settings::from_lookup(lookup(&[(ENV_CONFIG, "/nonexistent/waitkit_12345.yaml")]))
            .unwrap_err();
        match err {
            WaitError::Config(msg) => assert!(msg.contains("Failed to read settings file")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }
}
