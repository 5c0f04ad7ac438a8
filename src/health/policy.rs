//! Pluggable health check policies.
//!
//! # Responsibilities
//! - Define the contracts active and passive policies must satisfy
//! - Resolve policies by their configured name
//! - Provide the built-in policies
//!
//! # Design Decisions
//! - Active policies receive the complete batch of one tick's outcomes in a
//!   single call, so a policy can apply cluster-wide reasoning such as
//!   quorum or minimum-healthy-count
//! - Policy thresholds live in cluster metadata, keeping the policy
//!   contract itself free of policy-specific options
//! - A policy failure is an error value, caught at the scheduler and hook
//!   boundary and treated as "no change"

use crate::config::schema::ClusterConfig;
use crate::health::passive::{PassiveHealthContext, RequestOutcome};
use crate::health::state::HealthStatus;
use crate::health::transport::ProbeOutcome;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A configured policy implementation faulted.
#[derive(Debug, Error)]
#[error("policy '{policy}' failed: {message}")]
pub struct PolicyError {
    pub policy: &'static str,
    pub message: String,
}

/// Outcome of one probe within a tick, paired with the destination's health
/// going into the tick.
#[derive(Debug)]
pub struct ProbeResult {
    pub destination_id: String,
    pub current_active: HealthStatus,
    pub outcome: ProbeOutcome,
}

/// New active health for one destination, as decided by a policy.
#[derive(Debug, PartialEq, Eq)]
pub struct ActiveVerdict {
    pub destination_id: String,
    pub active: HealthStatus,
}

/// Evaluates one tick's worth of probe outcomes for a cluster.
pub trait ActiveHealthCheckPolicy: Send + Sync {
    /// Registered name, referenced from cluster configuration.
    fn name(&self) -> &'static str;

    /// Called exactly once per tick with the complete batch of results for
    /// the cluster's destinations. Returns the new active health of every
    /// destination it has a verdict for.
    fn evaluate(
        &self,
        cluster: &ClusterConfig,
        results: &[ProbeResult],
    ) -> Result<Vec<ActiveVerdict>, PolicyError>;

    /// A destination left the configuration; drop any per-destination
    /// bookkeeping.
    fn destination_removed(&self, _cluster_id: &str, _destination_id: &str) {}
}

/// Judges a destination's health from real proxied-traffic outcomes.
pub trait PassiveHealthCheckPolicy: Send + Sync {
    /// Registered name, referenced from cluster configuration.
    fn name(&self) -> &'static str;

    /// Called once per proxied request that selected a destination.
    fn request_proxied(
        &self,
        cluster: &ClusterConfig,
        destination_id: &str,
        outcome: &RequestOutcome,
        health: &PassiveHealthContext<'_>,
    ) -> Result<(), PolicyError>;

    /// A destination left the configuration; drop any per-destination
    /// bookkeeping.
    fn destination_removed(&self, _cluster_id: &str, _destination_id: &str) {}
}

/// Named policy registry. Configured policy names are resolved against this
/// at snapshot-validation time, before any traffic flows or loop starts.
pub struct PolicyRegistry {
    active: HashMap<&'static str, Arc<dyn ActiveHealthCheckPolicy>>,
    passive: HashMap<&'static str, Arc<dyn PassiveHealthCheckPolicy>>,
}

impl PolicyRegistry {
    /// An empty registry. Most callers want [`PolicyRegistry::default`],
    /// which registers the built-in policies.
    pub fn empty() -> Self {
        Self {
            active: HashMap::new(),
            passive: HashMap::new(),
        }
    }

    pub fn register_active(&mut self, policy: Arc<dyn ActiveHealthCheckPolicy>) {
        self.active.insert(policy.name(), policy);
    }

    pub fn register_passive(&mut self, policy: Arc<dyn PassiveHealthCheckPolicy>) {
        self.passive.insert(policy.name(), policy);
    }

    pub fn active(&self, name: &str) -> Option<Arc<dyn ActiveHealthCheckPolicy>> {
        self.active.get(name).cloned()
    }

    pub fn passive(&self, name: &str) -> Option<Arc<dyn PassiveHealthCheckPolicy>> {
        self.passive.get(name).cloned()
    }

    pub fn has_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn has_passive(&self, name: &str) -> bool {
        self.passive.contains_key(name)
    }

    /// Tell every registered policy that a destination left the
    /// configuration.
    pub fn notify_destination_removed(&self, cluster_id: &str, destination_id: &str) {
        for policy in self.active.values() {
            policy.destination_removed(cluster_id, destination_id);
        }
        for policy in self.passive.values() {
            policy.destination_removed(cluster_id, destination_id);
        }
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_active(Arc::new(ConsecutiveFailuresPolicy::new()));
        registry.register_passive(Arc::new(TransportFailuresPolicy::new()));
        registry
    }
}

fn counter_key(cluster_id: &str, destination_id: &str) -> String {
    format!("{}/{}", cluster_id, destination_id)
}

fn metadata_threshold(
    cluster: &ClusterConfig,
    key: &str,
    default: u32,
    policy: &'static str,
) -> Result<u32, PolicyError> {
    match cluster.metadata.get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| PolicyError {
            policy,
            message: format!(
                "cluster '{}': metadata key '{}' is not a number: '{}'",
                cluster.id, key, value
            ),
        }),
    }
}

/// Built-in active policy: a destination turns unhealthy after N consecutive
/// failed probes and healthy again on the first successful one.
///
/// The threshold is read from cluster metadata key
/// `consecutive_failures_threshold` (default 2). Below the threshold a
/// destination keeps its current state.
pub struct ConsecutiveFailuresPolicy {
    failures: DashMap<String, u32>,
}

impl ConsecutiveFailuresPolicy {
    pub const NAME: &'static str = "consecutive_failures";
    pub const THRESHOLD_KEY: &'static str = "consecutive_failures_threshold";
    const DEFAULT_THRESHOLD: u32 = 2;

    pub fn new() -> Self {
        Self {
            failures: DashMap::new(),
        }
    }
}

impl Default for ConsecutiveFailuresPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveHealthCheckPolicy for ConsecutiveFailuresPolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(
        &self,
        cluster: &ClusterConfig,
        results: &[ProbeResult],
    ) -> Result<Vec<ActiveVerdict>, PolicyError> {
        let threshold = metadata_threshold(
            cluster,
            Self::THRESHOLD_KEY,
            Self::DEFAULT_THRESHOLD,
            Self::NAME,
        )?;

        let mut verdicts = Vec::with_capacity(results.len());
        for result in results {
            let key = counter_key(&cluster.id, &result.destination_id);
            let active = if result.outcome.is_healthy_response() {
                self.failures.remove(&key);
                HealthStatus::Healthy
            } else {
                let mut entry = self.failures.entry(key).or_insert(0);
                *entry += 1;
                if *entry >= threshold {
                    HealthStatus::Unhealthy
                } else {
                    result.current_active
                }
            };
            verdicts.push(ActiveVerdict {
                destination_id: result.destination_id.clone(),
                active,
            });
        }
        Ok(verdicts)
    }

    fn destination_removed(&self, cluster_id: &str, destination_id: &str) {
        self.failures.remove(&counter_key(cluster_id, destination_id));
    }
}

/// Built-in passive policy: 5xx responses and transport failures count
/// against a destination, 4xx do not (client error, not backend). After N
/// consecutive failures the destination is marked passively unhealthy and
/// the reactivation cooldown is armed; any success resets the count and
/// marks it healthy.
///
/// The threshold is read from cluster metadata key
/// `transport_failure_threshold` (default 3).
pub struct TransportFailuresPolicy {
    failures: DashMap<String, u32>,
}

impl TransportFailuresPolicy {
    pub const NAME: &'static str = "transport_failures";
    pub const THRESHOLD_KEY: &'static str = "transport_failure_threshold";
    const DEFAULT_THRESHOLD: u32 = 3;

    pub fn new() -> Self {
        Self {
            failures: DashMap::new(),
        }
    }

    fn is_failure(outcome: &RequestOutcome) -> bool {
        match outcome {
            RequestOutcome::Response { status } => status.is_server_error(),
            RequestOutcome::TransportError { .. } => true,
        }
    }
}

impl Default for TransportFailuresPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl PassiveHealthCheckPolicy for TransportFailuresPolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn request_proxied(
        &self,
        cluster: &ClusterConfig,
        destination_id: &str,
        outcome: &RequestOutcome,
        health: &PassiveHealthContext<'_>,
    ) -> Result<(), PolicyError> {
        let threshold = metadata_threshold(
            cluster,
            Self::THRESHOLD_KEY,
            Self::DEFAULT_THRESHOLD,
            Self::NAME,
        )?;
        let key = counter_key(&cluster.id, destination_id);

        if !Self::is_failure(outcome) {
            self.failures.remove(&key);
            health.mark(HealthStatus::Healthy);
            return Ok(());
        }

        let failures = {
            let mut entry = self.failures.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if failures >= threshold {
            self.failures.remove(&key);
            health.mark(HealthStatus::Unhealthy);
            health.schedule_reactivation();
            tracing::warn!(
                cluster = %cluster.id,
                destination = %destination_id,
                failures,
                "Destination marked passively unhealthy, reactivation cooldown armed"
            );
        }
        Ok(())
    }

    fn destination_removed(&self, cluster_id: &str, destination_id: &str) {
        self.failures.remove(&counter_key(cluster_id, destination_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::DestinationHealthState;
    use crate::health::transport::TransportErrorKind;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn cluster_with_metadata(pairs: &[(&str, &str)]) -> ClusterConfig {
        ClusterConfig {
            id: "api".to_string(),
            destinations: HashMap::new(),
            health_check: Default::default(),
            outgoing_request: Default::default(),
            load_balancing_policy: None,
            session_affinity: None,
            metadata: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn probe_result(id: &str, current: HealthStatus, outcome: ProbeOutcome) -> ProbeResult {
        ProbeResult {
            destination_id: id.to_string(),
            current_active: current,
            outcome,
        }
    }

    fn failed_probe() -> ProbeOutcome {
        ProbeOutcome::Timeout
    }

    fn ok_probe() -> ProbeOutcome {
        ProbeOutcome::Response {
            status: StatusCode::OK,
            latency: Duration::from_millis(1),
        }
    }

    #[test]
    fn consecutive_failures_below_threshold_keeps_current_state() {
        let policy = ConsecutiveFailuresPolicy::new();
        let cluster = cluster_with_metadata(&[]);

        let verdicts = policy
            .evaluate(
                &cluster,
                &[probe_result("d1", HealthStatus::Healthy, failed_probe())],
            )
            .unwrap();
        assert_eq!(verdicts[0].active, HealthStatus::Healthy);

        // Second consecutive failure reaches the default threshold of 2.
        let verdicts = policy
            .evaluate(
                &cluster,
                &[probe_result("d1", HealthStatus::Healthy, failed_probe())],
            )
            .unwrap();
        assert_eq!(verdicts[0].active, HealthStatus::Unhealthy);
    }

    #[test]
    fn success_resets_failure_count_and_marks_healthy() {
        let policy = ConsecutiveFailuresPolicy::new();
        let cluster = cluster_with_metadata(&[]);

        policy
            .evaluate(
                &cluster,
                &[probe_result("d1", HealthStatus::Unknown, failed_probe())],
            )
            .unwrap();
        let verdicts = policy
            .evaluate(
                &cluster,
                &[probe_result("d1", HealthStatus::Unknown, ok_probe())],
            )
            .unwrap();
        assert_eq!(verdicts[0].active, HealthStatus::Healthy);

        // Counter restarted: one more failure stays below the threshold.
        let verdicts = policy
            .evaluate(
                &cluster,
                &[probe_result("d1", HealthStatus::Healthy, failed_probe())],
            )
            .unwrap();
        assert_eq!(verdicts[0].active, HealthStatus::Healthy);
    }

    #[test]
    fn threshold_read_from_cluster_metadata() {
        let policy = ConsecutiveFailuresPolicy::new();
        let cluster =
            cluster_with_metadata(&[(ConsecutiveFailuresPolicy::THRESHOLD_KEY, "1")]);

        let verdicts = policy
            .evaluate(
                &cluster,
                &[probe_result("d1", HealthStatus::Healthy, failed_probe())],
            )
            .unwrap();
        assert_eq!(verdicts[0].active, HealthStatus::Unhealthy);
    }

    #[test]
    fn malformed_threshold_is_a_policy_error() {
        let policy = ConsecutiveFailuresPolicy::new();
        let cluster =
            cluster_with_metadata(&[(ConsecutiveFailuresPolicy::THRESHOLD_KEY, "lots")]);

        let err = policy
            .evaluate(
                &cluster,
                &[probe_result("d1", HealthStatus::Healthy, failed_probe())],
            )
            .unwrap_err();
        assert_eq!(err.policy, ConsecutiveFailuresPolicy::NAME);
    }

    #[test]
    fn batch_verdicts_cover_all_destinations() {
        let policy = ConsecutiveFailuresPolicy::new();
        let cluster = cluster_with_metadata(&[]);

        let verdicts = policy
            .evaluate(
                &cluster,
                &[
                    probe_result("d1", HealthStatus::Unknown, ok_probe()),
                    probe_result("d2", HealthStatus::Unknown, failed_probe()),
                    probe_result("d3", HealthStatus::Unknown, ok_probe()),
                ],
            )
            .unwrap();
        assert_eq!(verdicts.len(), 3);
    }

    #[tokio::test]
    async fn transport_failures_marks_unhealthy_at_threshold() {
        let policy: Arc<dyn PassiveHealthCheckPolicy> = Arc::new(TransportFailuresPolicy::new());
        let cluster = cluster_with_metadata(&[(TransportFailuresPolicy::THRESHOLD_KEY, "2")]);
        let state = Arc::new(DestinationHealthState::new());
        let outcome = RequestOutcome::TransportError {
            kind: TransportErrorKind::Connection,
        };

        crate::health::passive::dispatch(&policy, &cluster, "d1", &state, &outcome);
        assert_eq!(state.passive(), HealthStatus::Unknown);

        crate::health::passive::dispatch(&policy, &cluster, "d1", &state, &outcome);
        assert_eq!(state.passive(), HealthStatus::Unhealthy);
        assert!(state.reactivation_armed());
        state.cancel_reactivation();
    }

    #[tokio::test]
    async fn client_errors_do_not_count_against_the_backend() {
        let policy: Arc<dyn PassiveHealthCheckPolicy> =
            Arc::new(TransportFailuresPolicy::new());
        let cluster = cluster_with_metadata(&[(TransportFailuresPolicy::THRESHOLD_KEY, "1")]);
        let state = Arc::new(DestinationHealthState::new());

        let outcome = RequestOutcome::Response {
            status: StatusCode::NOT_FOUND,
        };
        crate::health::passive::dispatch(&policy, &cluster, "d1", &state, &outcome);
        assert_eq!(state.passive(), HealthStatus::Healthy);

        let outcome = RequestOutcome::Response {
            status: StatusCode::BAD_GATEWAY,
        };
        crate::health::passive::dispatch(&policy, &cluster, "d1", &state, &outcome);
        assert_eq!(state.passive(), HealthStatus::Unhealthy);
        state.cancel_reactivation();
    }

    #[test]
    fn registry_resolves_builtins_by_name() {
        let registry = PolicyRegistry::default();
        assert!(registry.has_active(ConsecutiveFailuresPolicy::NAME));
        assert!(registry.has_passive(TransportFailuresPolicy::NAME));
        assert!(!registry.has_active("no_such_policy"));
        assert!(registry.active(ConsecutiveFailuresPolicy::NAME).is_some());
        assert!(registry.passive("no_such_policy").is_none());
    }
}
