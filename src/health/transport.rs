//! Probe transport seam.
//!
//! # Responsibilities
//! - Define the interface the probing loop sends probes through
//! - Classify responses, transport errors and timeouts into outcomes
//!
//! # Design Decisions
//! - Transport problems are data, not errors: a refused connection or an
//!   elapsed deadline comes back as an outcome for the policy to judge, so
//!   one slow destination can never abort a tick for its siblings

use crate::health::probe::ProbeRequest;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{StatusCode, Version};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::{Duration, Instant};

/// What happened to a single probe.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// The destination answered within the deadline.
    Response {
        status: StatusCode,
        latency: Duration,
    },
    /// The request never produced a response.
    TransportError {
        kind: TransportErrorKind,
        message: String,
    },
    /// The per-probe deadline elapsed.
    Timeout,
}

impl ProbeOutcome {
    /// Whether the probe proves the destination healthy: a response with a
    /// success status. Non-success statuses, transport errors and timeouts
    /// all count as failed probes.
    pub fn is_healthy_response(&self) -> bool {
        matches!(self, ProbeOutcome::Response { status, .. } if status.is_success())
    }

    pub fn result_label(&self) -> &'static str {
        match self {
            ProbeOutcome::Response { status, .. } if status.is_success() => "success",
            ProbeOutcome::Response { .. } => "bad_status",
            ProbeOutcome::TransportError { .. } => "error",
            ProbeOutcome::Timeout => "timeout",
        }
    }
}

/// Broad classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connection,
    /// The connection was established but the exchange failed.
    Protocol,
    /// The exchange did not finish within its deadline.
    Timeout,
}

/// Sends probe requests. The probing loop only depends on this seam; tests
/// substitute a scripted implementation.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn send(&self, probe: ProbeRequest) -> ProbeOutcome;
}

/// Default transport backed by shared hyper clients.
///
/// Probes default to HTTP/2, which over a cleartext connection means
/// prior-knowledge HTTP/2. The plain client would reject such a request
/// as an unsupported version, so HTTP/2 probes go through a dedicated
/// http2-only client and requests pinned to HTTP/1.x through the plain
/// one.
pub struct HttpProbeTransport {
    http1: Client<HttpConnector, Body>,
    http2: Client<HttpConnector, Body>,
}

impl HttpProbeTransport {
    pub fn new() -> Self {
        Self {
            http1: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            http2: Client::builder(TokioExecutor::new())
                .http2_only(true)
                .build(HttpConnector::new()),
        }
    }

    fn client_for(&self, version: Version) -> &Client<HttpConnector, Body> {
        if version == Version::HTTP_2 {
            &self.http2
        } else {
            &self.http1
        }
    }
}

impl Default for HttpProbeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn send(&self, probe: ProbeRequest) -> ProbeOutcome {
        let start = Instant::now();
        let client = self.client_for(probe.request.version());
        let response = tokio::time::timeout(probe.timeout, client.request(probe.request));

        match response.await {
            Ok(Ok(response)) => ProbeOutcome::Response {
                status: response.status(),
                latency: start.elapsed(),
            },
            Ok(Err(e)) => ProbeOutcome::TransportError {
                kind: if e.is_connect() {
                    TransportErrorKind::Connection
                } else {
                    TransportErrorKind::Protocol
                },
                message: e.to_string(),
            },
            Err(_) => ProbeOutcome::Timeout,
        }
    }
}
