//! Health subsystem coordinator.
//!
//! # Responsibilities
//! - Own all per-destination health state and per-cluster probing loops
//! - Diff configuration snapshots and start/stop/replace loops accordingly
//! - Expose the composite availability read path to the load balancer
//! - Accept proxied-request outcomes for passive evaluation
//!
//! # Design Decisions
//! - Snapshot reconciliation replaces a changed cluster's loop wholesale
//!   (stop old, start new) instead of patching running timers in place
//! - Destinations that survive a reload keep their health state; removed
//!   destinations have their reactivation timer cancelled synchronously
//!   before the state is dropped
//! - Destinations not (or not yet) known to the subsystem read as
//!   available: the composite rule deliberately favors availability over
//!   caution for fresh state

use crate::config::loader::ConfigError;
use crate::config::schema::{ClusterConfig, DestinationConfig, ProxyConfig};
use crate::config::validation::validate_clusters;
use crate::health::active::{ClusterHealthRuntime, ClusterRuntimeHandle};
use crate::health::availability::is_destination_available;
use crate::health::passive::{self, RequestOutcome};
use crate::health::policy::{PassiveHealthCheckPolicy, PolicyRegistry};
use crate::health::state::{DestinationHealthState, HealthStatus};
use crate::health::transport::ProbeTransport;
use crate::observability::metrics;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// One destination as tracked by the health subsystem: its configuration
/// and its mutable health state.
#[derive(Clone)]
pub struct DestinationEntry {
    pub id: String,
    pub config: Arc<DestinationConfig>,
    pub state: Arc<DestinationHealthState>,
}

struct ClusterEntry {
    config: Arc<ClusterConfig>,
    destinations: HashMap<String, DestinationEntry>,
    runtime: Option<ClusterRuntimeHandle>,
    /// Resolved once at snapshot application when passive checks are
    /// enabled, never looked up per request.
    passive_policy: Option<Arc<dyn PassiveHealthCheckPolicy>>,
}

/// The backend-health subsystem: decides, continuously and per destination,
/// whether a backend is eligible to receive proxied traffic.
pub struct HealthCheckSystem {
    registry: Arc<PolicyRegistry>,
    transport: Arc<dyn ProbeTransport>,
    clusters: DashMap<String, ClusterEntry>,
    snapshot: ArcSwap<ProxyConfig>,
}

impl HealthCheckSystem {
    pub fn new(registry: Arc<PolicyRegistry>, transport: Arc<dyn ProbeTransport>) -> Self {
        Self {
            registry,
            transport,
            clusters: DashMap::new(),
            snapshot: ArcSwap::from_pointee(ProxyConfig::default()),
        }
    }

    fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.snapshot.load().runtime.probe_drain_grace_secs)
    }

    /// Apply a full configuration snapshot: validate it, then diff against
    /// the running cluster set.
    ///
    /// Fails as a whole on validation errors, leaving the running
    /// configuration untouched; no loop for an invalid cluster ever starts.
    pub async fn apply_config(&self, config: ProxyConfig) -> Result<(), ConfigError> {
        validate_clusters(&config.clusters, &self.registry).map_err(ConfigError::Validation)?;

        let clusters = config.clusters.clone();
        self.snapshot.store(Arc::new(config));
        self.apply_clusters(clusters).await
    }

    /// The most recently applied snapshot.
    pub fn current_config(&self) -> Arc<ProxyConfig> {
        self.snapshot.load_full()
    }

    async fn apply_clusters(&self, clusters: Vec<ClusterConfig>) -> Result<(), ConfigError> {
        let new_ids: HashSet<String> = clusters.iter().map(|c| c.id.clone()).collect();
        let removed: Vec<String> = self
            .clusters
            .iter()
            .filter(|entry| !new_ids.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        for id in removed {
            if let Some((_, entry)) = self.clusters.remove(&id) {
                tracing::info!(cluster = %id, "Cluster removed from configuration");
                self.teardown_cluster(entry).await;
            }
        }

        for cluster in clusters {
            let id = cluster.id.clone();
            // Take the existing entry out so no dashmap guard is held
            // across the awaits below. While an entry is out, its
            // destinations read as available.
            let previous = self.clusters.remove(&id).map(|(_, entry)| entry);

            let entry = match previous {
                Some(existing) if *existing.config == cluster => existing,
                previous => self.build_cluster(cluster, previous).await,
            };
            self.clusters.insert(id, entry);
        }

        Ok(())
    }

    /// Build (or rebuild) the tracked state of one cluster. Any previous
    /// probing loop is stopped first; surviving destinations carry their
    /// health state over.
    async fn build_cluster(
        &self,
        cluster: ClusterConfig,
        previous: Option<ClusterEntry>,
    ) -> ClusterEntry {
        let config = Arc::new(cluster);

        let mut previous_destinations = HashMap::new();
        if let Some(previous) = previous {
            if let Some(runtime) = previous.runtime {
                runtime.shutdown(self.drain_grace()).await;
            }
            previous_destinations = previous.destinations;
        }

        let mut destinations = HashMap::with_capacity(config.destinations.len());
        for (id, destination_config) in &config.destinations {
            let entry = match previous_destinations.remove(id) {
                Some(existing) => DestinationEntry {
                    id: id.clone(),
                    config: Arc::new(destination_config.clone()),
                    state: existing.state,
                },
                None => {
                    tracing::info!(cluster = %config.id, destination = %id, "Destination added");
                    DestinationEntry {
                        id: id.clone(),
                        config: Arc::new(destination_config.clone()),
                        state: Arc::new(DestinationHealthState::new()),
                    }
                }
            };
            destinations.insert(id.clone(), entry);
        }

        for (id, stale) in previous_destinations {
            self.discard_destination(&config.id, &id, &stale);
        }

        let runtime = if config.health_check.active.enabled {
            match self.registry.active(&config.health_check.active.policy) {
                Some(policy) => Some(ClusterHealthRuntime::spawn(
                    Arc::clone(&config),
                    destinations.values().cloned().collect(),
                    policy,
                    Arc::clone(&self.transport),
                )),
                None => {
                    // Unreachable past validation; refuse to start a loop
                    // rather than guess a policy.
                    tracing::error!(
                        cluster = %config.id,
                        policy = %config.health_check.active.policy,
                        "Active policy missing from registry, probing not started"
                    );
                    None
                }
            }
        } else {
            None
        };

        let passive_policy = if config.health_check.passive.enabled {
            let policy = self.registry.passive(&config.health_check.passive.policy);
            if policy.is_none() {
                tracing::error!(
                    cluster = %config.id,
                    policy = %config.health_check.passive.policy,
                    "Passive policy missing from registry, passive checks inert"
                );
            }
            policy
        } else {
            None
        };

        ClusterEntry {
            config,
            destinations,
            runtime,
            passive_policy,
        }
    }

    async fn teardown_cluster(&self, entry: ClusterEntry) {
        if let Some(runtime) = entry.runtime {
            runtime.shutdown(self.drain_grace()).await;
        }
        for (id, destination) in &entry.destinations {
            self.discard_destination(&entry.config.id, id, destination);
        }
    }

    fn discard_destination(&self, cluster_id: &str, id: &str, entry: &DestinationEntry) {
        // Cancel before the state can be dropped: a reactivation timer must
        // never fire for a removed destination.
        entry.state.cancel_reactivation();
        self.registry.notify_destination_removed(cluster_id, id);
        tracing::info!(cluster = %cluster_id, destination = %id, "Destination removed");
    }

    /// Composite availability of one destination, read by the load balancer
    /// on every request. Never blocks.
    ///
    /// Destinations unknown to the subsystem read as available, matching
    /// the rule's treatment of fresh state.
    pub fn is_available(&self, cluster_id: &str, destination_id: &str) -> bool {
        match self.clusters.get(cluster_id) {
            Some(entry) => match entry.destinations.get(destination_id) {
                Some(destination) => {
                    is_destination_available(&entry.config.health_check, &destination.state)
                }
                None => true,
            },
            None => true,
        }
    }

    /// The cluster's destinations currently eligible for traffic, for the
    /// destination-selection path.
    pub fn available_destinations(&self, cluster_id: &str) -> Vec<DestinationEntry> {
        match self.clusters.get(cluster_id) {
            Some(entry) => entry
                .destinations
                .values()
                .filter(|d| is_destination_available(&entry.config.health_check, &d.state))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// One destination's tracked entry, for introspection.
    pub fn destination_entry(
        &self,
        cluster_id: &str,
        destination_id: &str,
    ) -> Option<DestinationEntry> {
        let entry = self.clusters.get(cluster_id)?;
        entry.destinations.get(destination_id).cloned()
    }

    /// Active and passive health of one destination, for introspection.
    pub fn destination_health(
        &self,
        cluster_id: &str,
        destination_id: &str,
    ) -> Option<(HealthStatus, HealthStatus)> {
        let entry = self.clusters.get(cluster_id)?;
        let destination = entry.destinations.get(destination_id)?;
        Some((destination.state.active(), destination.state.passive()))
    }

    /// Passive health check hook, invoked synchronously on the
    /// request-completion path after every proxied request.
    ///
    /// `destination_id` is `None` when the request never reached destination
    /// selection; such requests are not reported to any policy. Also a
    /// no-op when passive checks are disabled for the cluster.
    pub fn report_request(
        &self,
        cluster_id: &str,
        destination_id: Option<&str>,
        outcome: RequestOutcome,
    ) {
        let Some(destination_id) = destination_id else {
            return;
        };
        let Some(entry) = self.clusters.get(cluster_id) else {
            // Possible in the window while a cluster entry is out for rebuild.
            tracing::debug!(
                cluster = %cluster_id,
                "Outcome reported for unknown cluster, dropped"
            );
            return;
        };
        if !entry.config.health_check.passive.enabled {
            return;
        }
        let Some(policy) = &entry.passive_policy else {
            return;
        };
        let Some(destination) = entry.destinations.get(destination_id) else {
            tracing::debug!(
                cluster = %cluster_id,
                destination = %destination_id,
                "Outcome reported for unknown destination, dropped"
            );
            return;
        };

        passive::dispatch(
            policy,
            &entry.config,
            destination_id,
            &destination.state,
            &outcome,
        );
        metrics::record_destination_availability(
            cluster_id,
            destination_id,
            is_destination_available(&entry.config.health_check, &destination.state),
        );
    }

    /// Stop every probing loop and cancel every armed timer.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.clusters.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, entry)) = self.clusters.remove(&id) {
                self.teardown_cluster(entry).await;
            }
        }
        tracing::info!("Health subsystem shut down");
    }
}
