//! Shared utilities for integration testing.

use async_trait::async_trait;
use axum::http::StatusCode;
use edge_relay::config::schema::{ClusterConfig, DestinationConfig};
use edge_relay::health::probe::ProbeRequest;
use edge_relay::health::transport::{ProbeOutcome, ProbeTransport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted probe transport: answers each probe from a per-URI script and
/// records everything it was asked to send.
pub struct MockTransport {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    probed: Mutex<Vec<String>>,
    count: AtomicUsize,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            probed: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    /// Script the outcome returned for a probe to the given URI. Unscripted
    /// URIs answer 200 OK.
    pub fn set_outcome(&self, uri: &str, outcome: ProbeOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(uri.to_string(), outcome);
    }

    pub fn probe_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn probed_uris(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeTransport for MockTransport {
    async fn send(&self, probe: ProbeRequest) -> ProbeOutcome {
        let uri = probe.request.uri().to_string();
        self.probed.lock().unwrap().push(uri.clone());
        self.count.fetch_add(1, Ordering::SeqCst);

        self.outcomes
            .lock()
            .unwrap()
            .get(&uri)
            .cloned()
            .unwrap_or(ProbeOutcome::Response {
                status: StatusCode::OK,
                latency: Duration::from_millis(1),
            })
    }
}

/// A cluster with no health checks enabled and the given destinations.
#[allow(dead_code)]
pub fn cluster(id: &str, destinations: &[(&str, &str)]) -> ClusterConfig {
    ClusterConfig {
        id: id.to_string(),
        destinations: destinations
            .iter()
            .map(|(destination_id, address)| {
                (
                    destination_id.to_string(),
                    DestinationConfig {
                        address: address.to_string(),
                        health: None,
                        metadata: HashMap::new(),
                    },
                )
            })
            .collect(),
        health_check: Default::default(),
        outgoing_request: Default::default(),
        load_balancing_policy: None,
        session_affinity: None,
        metadata: HashMap::new(),
    }
}

/// Enable active probing: one-second interval, one-second probe timeout.
#[allow(dead_code)]
pub fn enable_active(cluster: &mut ClusterConfig, policy: &str) {
    cluster.health_check.active.enabled = true;
    cluster.health_check.active.interval_secs = 1;
    cluster.health_check.active.timeout_secs = Some(1);
    cluster.health_check.active.policy = policy.to_string();
}

/// Enable passive checks with a one-second reactivation period.
#[allow(dead_code)]
pub fn enable_passive(cluster: &mut ClusterConfig, policy: &str) {
    cluster.health_check.passive.enabled = true;
    cluster.health_check.passive.policy = policy.to_string();
    cluster.health_check.passive.reactivation_period_secs = 1;
}

#[allow(dead_code)]
pub fn set_metadata(cluster: &mut ClusterConfig, key: &str, value: &str) {
    cluster.metadata.insert(key.to_string(), value.to_string());
}
