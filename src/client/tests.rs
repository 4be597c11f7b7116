// SPDX-License-Identifier: MIT OR Apache-2.0

use super::*;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scripted container: every reload advances the script by one step.
struct FakeContainer {
    name: String,
    reloads: usize,
    statuses: Vec<ContainerStatus>,
    script: Vec<&'static str>,
    publish_after: usize,
    bindings: PortBindings,
    current_ports: PortBindings,
    broken: bool,
}

impl FakeContainer {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reloads: 0,
            statuses: vec![ContainerStatus::Running],
            script: Vec::new(),
            publish_after: 0,
            bindings: PortBindings::new(),
            current_ports: PortBindings::new(),
            broken: false,
        }
    }

    fn with_statuses(mut self, statuses: &[&str]) -> Self {
        self.statuses = statuses.iter().map(|s| ContainerStatus::from(*s)).collect();
        self
    }

    fn with_script(mut self, lines: &[&'static str]) -> Self {
        self.script = lines.to_vec();
        self
    }

    fn with_ports(mut self, bindings: PortBindings, publish_after: usize) -> Self {
        self.bindings = bindings;
        self.publish_after = publish_after;
        self
    }
}

#[async_trait]
impl ContainerHandle for FakeContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reload(&mut self) -> Result<()> {
        if self.broken {
            return Err(WaitError::Runtime(format!("No such container: {}", self.name)));
        }
        self.reloads += 1;
        if self.reloads >= self.publish_after {
            self.current_ports = self.bindings.clone();
        }
        Ok(())
    }

    fn status(&self) -> ContainerStatus {
        let idx = self.reloads.min(self.statuses.len() - 1);
        self.statuses[idx].clone()
    }

    async fn log_lines(&self, tail: usize) -> Result<Vec<String>> {
        let visible = &self.script[..self.reloads.min(self.script.len())];
        let skip = visible.len().saturating_sub(tail);
        Ok(visible[skip..].iter().map(|l| l.to_string()).collect())
    }

    fn ports(&self) -> &PortBindings {
        &self.current_ports
    }
}

fn fast_settings(timeout: Duration) -> Settings {
    Settings::default()
        .with_timeout(timeout)
        .with_step(Duration::from_millis(20))
        .with_probe_host("127.0.0.1")
        .with_http_timeout(Duration::from_secs(2))
}

#[test]
fn test_status_names() {
    assert_eq!("running".parse::<ContainerStatus>().unwrap(), ContainerStatus::Running);
    assert_eq!(ContainerStatus::from("exited"), ContainerStatus::Exited);
    assert_eq!(
        ContainerStatus::from("starting"),
        ContainerStatus::Other("starting".to_string())
    );
    assert_eq!(ContainerStatus::Removing.to_string(), "removing");
    assert_eq!(ContainerStatus::Other("starting".into()).to_string(), "starting");
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_status_reached() {
    let mut container =
        FakeContainer::new("lapi").with_statuses(&["created", "created", "created", "running"]);

    container
        .wait_for_status(ContainerStatus::Running, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(container.reloads, 3);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_status_timeout() {
    let mut container = FakeContainer::new("lapi").with_statuses(&["created", "starting"]);

    let err = container
        .wait_for_status(ContainerStatus::Running, Duration::from_secs(5))
        .await
        .unwrap_err();

    match &err {
        WaitError::Timeout {
            resource,
            last,
            target,
            timeout,
        } => {
            assert_eq!(resource, "lapi");
            assert_eq!(last, &ContainerStatus::Other("starting".into()));
            assert_eq!(target, &ContainerStatus::Running);
            assert_eq!(*timeout, Duration::from_secs(5));
        }
        other => panic!("Expected Timeout error, got {other:?}"),
    }
    assert_eq!(
        err.to_string(),
        "Container lapi (starting) did not reach state running in 5 seconds"
    );
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_log_sees_refreshed_logs() {
    let mut container =
        FakeContainer::new("lapi").with_script(&["first", "second", "third", "fourth"]);

    container
        .wait_for_log(&["first", "th*d"], &fast_settings(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(container.reloads, 3);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_log_reports_last_mismatch() {
    let mut container = FakeContainer::new("lapi").with_script(&["first", "second"]);

    let err = container
        .wait_for_log(&["first", "never"], &fast_settings(Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(err.is_recoverable());
    let msg = err.to_string();
    assert!(msg.contains("'never'"));
    // the report reflects the latest logs, not the first attempt's
    assert!(msg.contains("second"));
}

#[tokio::test(start_paused = true)]
async fn test_log_tail_limits_lines() {
    let mut container = FakeContainer::new("lapi").with_script(&["a", "b", "c"]);
    let settings = fast_settings(Duration::from_secs(1)).with_log_tail(1);

    let mut waiter = container.log_waiter(&settings);
    let mut seen = Vec::new();
    while let Some(attempt) = waiter.next_attempt().await.unwrap() {
        seen.push(attempt.context().lines().to_vec());
        let done = attempt.check(|m| m.fnmatch_lines(&["c"])).unwrap();
        if done.is_some() {
            break;
        }
    }
    assert_eq!(seen, vec![vec!["a"], vec!["b"], vec!["c"]]);
}

#[tokio::test(start_paused = true)]
async fn test_reload_error_aborts_wait() {
    let mut container = FakeContainer::new("gone").with_script(&["x"]);
    container.broken = true;

    let err = container
        .wait_for_log(&["x"], &fast_settings(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, WaitError::Runtime(_)));
}

#[tokio::test]
async fn test_wait_for_http_after_publish() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut container = FakeContainer::new("lapi")
        .with_ports(PortBindings::new().with_tcp(8080, server.address().port()), 3);

    let status = container
        .wait_for_http(8080, "/health", None, &fast_settings(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(status, Some(StatusCode::OK));
    assert_eq!(container.reloads, 3);
}

#[tokio::test]
async fn test_wait_for_http_wrong_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut container = FakeContainer::new("lapi")
        .with_ports(PortBindings::new().with_tcp(8080, server.address().port()), 0);

    let err = container
        .wait_for_http(
            8080,
            "/health",
            Some(StatusCode::OK),
            &fast_settings(Duration::from_millis(300)),
        )
        .await
        .unwrap_err();

    assert!(err.is_recoverable());
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_wait_for_http_never_published() {
    let mut container = FakeContainer::new("lapi");

    let err = container
        .wait_for_http(8080, "/", None, &fast_settings(Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no HTTP answer on port 8080/"));
}

#[tokio::test]
async fn test_wait_for_http_zero_budget() {
    let mut container = FakeContainer::new("lapi");
    let status = container
        .wait_for_http(8080, "/", None, &fast_settings(Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(status, None);
    assert_eq!(container.reloads, 0);
}

#[tokio::test]
async fn test_probe_uses_current_ports() {
    let container = FakeContainer::new("lapi");
    let probe = container.probe(&Settings::default());
    assert_eq!(probe.get_bound_port(8080), None);
}
