//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy's
//! backend-health subsystem. All types derive Serde traits for
//! deserialization from config files.
//!
//! Cluster-level types additionally derive `PartialEq`: the health subsystem
//! compares the old and new snapshot of a cluster on hot reload to decide
//! whether its probing loop must be replaced.

use axum::http::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Traffic cluster definitions.
    pub clusters: Vec<ClusterConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Health-runtime tuning knobs.
    pub runtime: RuntimeOptions,
}

/// A logical named group of interchangeable backend destinations.
///
/// Immutable once constructed; a configuration change produces a brand-new
/// value, never an in-place mutation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Unique cluster identifier.
    pub id: String,

    /// Destinations keyed by destination id.
    #[serde(default)]
    pub destinations: HashMap<String, DestinationConfig>,

    /// Active and passive health check settings.
    #[serde(default)]
    pub health_check: HealthCheckOptions,

    /// Options applied to outgoing requests, probes included.
    #[serde(default)]
    pub outgoing_request: OutgoingRequestOptions,

    /// Load balancing policy name (consumed by destination selection).
    #[serde(default)]
    pub load_balancing_policy: Option<String>,

    /// Session affinity settings (consumed by destination selection).
    #[serde(default)]
    pub session_affinity: Option<SessionAffinityOptions>,

    /// Free-form metadata; policies may read tuning keys from here.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One backend server within a cluster.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DestinationConfig {
    /// Base URI used for proxied traffic.
    pub address: String,

    /// Base URI used only for health probes. Defaults to `address`.
    #[serde(default)]
    pub health: Option<String>,

    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Health check settings. Active and passive checks enable independently.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HealthCheckOptions {
    pub active: ActiveHealthCheckOptions,
    pub passive: PassiveHealthCheckOptions,
}

/// Active (probing) health check settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActiveHealthCheckOptions {
    /// Enable periodic probing for the cluster.
    pub enabled: bool,

    /// Probing interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds. Required when probing is enabled;
    /// there is deliberately no fallback.
    pub timeout_secs: Option<u64>,

    /// Name of the active health check policy.
    pub policy: String,

    /// Path probed on each destination. When absent, the destination's
    /// health (or main) address is probed unmodified.
    pub path: Option<String>,
}

impl Default for ActiveHealthCheckOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            timeout_secs: None,
            policy: "consecutive_failures".to_string(),
            path: None,
        }
    }
}

/// Passive (traffic observation) health check settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PassiveHealthCheckOptions {
    /// Enable passive evaluation of proxied-traffic outcomes.
    pub enabled: bool,

    /// Name of the passive health check policy.
    pub policy: String,

    /// Cooldown in seconds before a passively failed destination becomes
    /// eligible again.
    pub reactivation_period_secs: u64,
}

impl Default for PassiveHealthCheckOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: "transport_failures".to_string(),
            reactivation_period_secs: 60,
        }
    }
}

/// Options for outgoing requests to a cluster's destinations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OutgoingRequestOptions {
    /// Time allowed to send the request and receive the response headers,
    /// in seconds.
    pub timeout_secs: Option<u64>,

    /// Preferred HTTP version of the outgoing request.
    pub version: Option<HttpVersion>,

    /// Policy applied to version selection.
    pub version_policy: Option<HttpVersionPolicy>,
}

/// HTTP protocol version, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum HttpVersion {
    #[serde(rename = "1.0")]
    Http10,
    #[serde(rename = "1.1")]
    Http11,
    #[serde(rename = "2")]
    Http2,
}

impl HttpVersion {
    pub fn as_http(self) -> Version {
        match self {
            HttpVersion::Http10 => Version::HTTP_10,
            HttpVersion::Http11 => Version::HTTP_11,
            HttpVersion::Http2 => Version::HTTP_2,
        }
    }
}

/// How strictly the configured version is negotiated with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpVersionPolicy {
    RequestVersionExact,
    RequestVersionOrLower,
    RequestVersionOrHigher,
}

/// Session affinity settings. Carried as data for the destination-selection
/// path; the health subsystem does not interpret them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SessionAffinityOptions {
    pub enabled: bool,
    pub mode: Option<String>,
    pub failure_policy: Option<String>,
    pub affinity_key_name: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Health-runtime tuning knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Grace period in seconds to let in-flight probes drain when a
    /// cluster's probing loop is stopped or replaced.
    pub probe_drain_grace_secs: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            probe_drain_grace_secs: 5,
        }
    }
}
