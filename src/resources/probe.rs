// SPDX-License-Identifier: MIT OR Apache-2.0

//! Published ports and best-effort HTTP probing.
//!
//! A probe never treats "not there yet" as an error: an unpublished port or a
//! refused connection yields `None`, so a check can assert on it and be
//! retried. Only genuinely unexpected failures (a malformed URI, a request
//! that hangs past its timeout) are returned as errors.

use bytes::Bytes;
use http::{Request, StatusCode, Uri};
use http_body_util::Empty;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::{Settings, DEFAULT_HTTP_TIMEOUT};
use crate::error::{Result, WaitError};

/// One host-side binding of a container port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortBinding {
    #[serde(rename = "HostIp", default)]
    pub host_ip: String,
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

/// Container port bindings, keyed by `"<port>/<proto>"`.
///
/// Mirrors the `NetworkSettings.Ports` object of `docker inspect`, where a
/// `null` value means the port is exposed but not published.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PortBindings(BTreeMap<String, Option<Vec<PortBinding>>>);

impl PortBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `internal` (tcp) on `host_port`.
    #[must_use]
    pub fn with_tcp(mut self, internal: u16, host_port: u16) -> Self {
        self.0.insert(
            format!("{internal}/tcp"),
            Some(vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: host_port.to_string(),
            }]),
        );
        self
    }

    /// Expose `internal` (tcp) without publishing it.
    #[must_use]
    pub fn with_unpublished(mut self, internal: u16) -> Self {
        self.0.insert(format!("{internal}/tcp"), None);
        self
    }

    /// Host port bound to the tcp port `internal`, if published.
    pub fn get_bound_port(&self, internal: u16) -> Option<u16> {
        self.0
            .get(&format!("{internal}/tcp"))?
            .as_ref()?
            .first()?
            .host_port
            .parse()
            .ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Single-shot view of a resource's network endpoints.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    ports: PortBindings,
    host: String,
    timeout: Duration,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl NetworkProbe {
    /// Probe `ports` on `localhost` with the default request timeout.
    pub fn new(ports: PortBindings) -> Self {
        Self::with_client(
            ports,
            "localhost",
            DEFAULT_HTTP_TIMEOUT,
            http_client(DEFAULT_HTTP_TIMEOUT),
        )
    }

    /// Probe `ports` using the host and timeout from `settings`.
    pub fn from_settings(ports: PortBindings, settings: &Settings) -> Self {
        Self::with_client(
            ports,
            settings.probe_host.clone(),
            settings.http_timeout,
            http_client(settings.http_timeout),
        )
    }

    /// Reuse an existing HTTP client; see [`http_client`].
    pub fn with_client(
        ports: PortBindings,
        host: impl Into<String>,
        timeout: Duration,
        client: Client<HttpConnector, Empty<Bytes>>,
    ) -> Self {
        Self {
            ports,
            host: host.into(),
            timeout,
            client,
        }
    }

    pub fn ports(&self) -> &PortBindings {
        &self.ports
    }

    /// Host port bound to `port`, or `None` if not published yet.
    pub fn get_bound_port(&self, port: u16) -> Option<u16> {
        self.ports.get_bound_port(port)
    }

    /// Issue one `GET` to the host port bound to `port`.
    ///
    /// Returns `Ok(None)` when the port is not published or the connection
    /// fails (refused, reset, closed before a response).
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Http`] if the URI is malformed or the request
    /// does not complete within the probe timeout.
    pub async fn http_status_code(&self, port: u16, path: &str) -> Result<Option<StatusCode>> {
        let Some(bound) = self.get_bound_port(port) else {
            trace!(port, "port not published yet");
            return Ok(None);
        };

        let uri: Uri = format!("http://{}:{}{}", self.host, bound, path)
            .parse()
            .map_err(|e| WaitError::Http(format!("invalid probe URI for port {port}: {e}")))?;
        let request = Request::get(uri.clone())
            .body(Empty::<Bytes>::new())
            .map_err(|e| WaitError::Http(format!("failed to build request for {uri}: {e}")))?;

        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                debug!(%uri, status = %response.status(), "probe answered");
                Ok(Some(response.status()))
            }
            Ok(Err(e)) if is_unreachable(&e) => {
                trace!(%uri, error = %e, "probe unreachable");
                Ok(None)
            }
            Ok(Err(e)) => Err(WaitError::Http(format!("GET {uri} failed: {e}"))),
            Err(_) => Err(WaitError::Http(format!(
                "GET {uri} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Build the HTTP client used by probes. Connection attempts give up after
/// `connect_timeout`, which counts as unreachable.
pub fn http_client(connect_timeout: Duration) -> Client<HttpConnector, Empty<Bytes>> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    Client::builder(TokioExecutor::new()).build(connector)
}

fn is_unreachable(err: &hyper_util::client::legacy::Error) -> bool {
    if err.is_connect() {
        return true;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_closed() {
                return true;
            }
        }
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
