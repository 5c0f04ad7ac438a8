//! Probe request construction.
//!
//! # Responsibilities
//! - Build one outgoing health-check request per destination from
//!   configuration, with no side effects
//!
//! # Design Decisions
//! - The destination's dedicated health address wins over its main address
//! - The probe's HTTP version defaults to HTTP/2 independent of what the
//!   cluster uses for ordinary proxied traffic
//! - The per-probe timeout comes from the cluster's active-check options
//!   with no fallback; its absence is a configuration error

use crate::config::loader::ConfigError;
use crate::config::schema::{ClusterConfig, DestinationConfig, HttpVersionPolicy};
use axum::body::Body;
use axum::http::{header, Method, Request, Version};
use std::time::Duration;
use url::Url;

/// Probes identify themselves to backends with this agent string.
const PROBE_USER_AGENT: &str = "edge-relay-health-probe";

/// One ready-to-send health probe.
#[derive(Debug)]
pub struct ProbeRequest {
    pub request: Request<Body>,
    pub timeout: Duration,
}

impl ProbeRequest {
    /// The version-negotiation policy copied from cluster configuration,
    /// if one was set.
    pub fn version_policy(&self) -> Option<HttpVersionPolicy> {
        self.request.extensions().get::<HttpVersionPolicy>().copied()
    }
}

/// Build the probe request for one destination of a cluster.
///
/// Pure construction. Fails only when the configured address does not parse
/// or the per-probe timeout is missing, both of which are configuration
/// errors caught by validation before a probing loop starts.
pub fn create_probe_request(
    cluster: &ClusterConfig,
    destination: &DestinationConfig,
) -> Result<ProbeRequest, ConfigError> {
    let base = destination.health.as_deref().unwrap_or(&destination.address);
    let mut url = Url::parse(base).map_err(|_| ConfigError::ProbeAddress {
        cluster: cluster.id.clone(),
        address: base.to_string(),
    })?;

    if let Some(path) = &cluster.health_check.active.path {
        url.set_path(&join_probe_path(url.path(), path));
    }

    let timeout_secs = cluster
        .health_check
        .active
        .timeout_secs
        .ok_or_else(|| ConfigError::MissingProbeTimeout {
            cluster: cluster.id.clone(),
        })?;

    let version = cluster
        .outgoing_request
        .version
        .map(|v| v.as_http())
        .unwrap_or(Version::HTTP_2);

    let mut request = Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .version(version)
        .header(header::USER_AGENT, PROBE_USER_AGENT)
        .body(Body::empty())
        .map_err(|_| ConfigError::ProbeAddress {
            cluster: cluster.id.clone(),
            address: url.as_str().to_string(),
        })?;

    if let Some(policy) = cluster.outgoing_request.version_policy {
        request.extensions_mut().insert(policy);
    }

    Ok(ProbeRequest {
        request,
        timeout: Duration::from_secs(timeout_secs),
    })
}

/// Combine a base path with the configured probe path such that exactly one
/// slash separates them. A single trailing slash of the base is trimmed; the
/// probe path's own leading and trailing slashes are preserved verbatim.
fn join_probe_path(base_path: &str, probe_path: &str) -> String {
    let base = base_path.strip_suffix('/').unwrap_or(base_path);
    let mut combined = String::with_capacity(base.len() + probe_path.len() + 1);
    combined.push_str(base);
    if !probe_path.starts_with('/') {
        combined.push('/');
    }
    combined.push_str(probe_path);
    combined
}
