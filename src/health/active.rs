//! Active health checking.
//!
//! # Responsibilities
//! - Run one independent periodic probing loop per cluster
//! - Fan out concurrent probes to the cluster's destinations each tick
//! - Hand the complete batch of outcomes to the cluster's active policy
//!   and apply its verdicts
//!
//! # Design Decisions
//! - The first probe round runs immediately when the loop starts; later
//!   rounds follow at the configured interval
//! - A round is awaited in full before the next tick is taken, so rounds
//!   never overlap and a slow tick delays rather than corrupts the next
//! - A probe failure is an outcome for the policy, never a loop error;
//!   only malformed configuration keeps a loop from starting at all

use crate::config::schema::ClusterConfig;
use crate::health::availability::is_destination_available;
use crate::health::policy::{ActiveHealthCheckPolicy, ProbeResult};
use crate::health::probe::create_probe_request;
use crate::health::system::DestinationEntry;
use crate::health::transport::{ProbeOutcome, ProbeTransport, TransportErrorKind};
use crate::observability::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};

/// Per-cluster probing loop. Holds the cluster's configuration snapshot and
/// the destination set it probes; replaced wholesale on any configuration
/// change rather than reconciled in place.
pub struct ClusterHealthRuntime {
    cluster: Arc<ClusterConfig>,
    destinations: Vec<DestinationEntry>,
    policy: Arc<dyn ActiveHealthCheckPolicy>,
    transport: Arc<dyn ProbeTransport>,
}

/// Stop handle for a running [`ClusterHealthRuntime`] loop.
pub struct ClusterRuntimeHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ClusterRuntimeHandle {
    /// Stop the loop cooperatively: no further tick starts, and the current
    /// round is given `grace` to drain before being abandoned.
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.stop.send(true);
        if time::timeout(grace, &mut self.join).await.is_err() {
            tracing::warn!("Probing loop did not drain within grace period, aborting");
            self.join.abort();
        }
    }
}

impl ClusterHealthRuntime {
    /// Spawn the probing loop for a cluster with active checks enabled.
    pub fn spawn(
        cluster: Arc<ClusterConfig>,
        destinations: Vec<DestinationEntry>,
        policy: Arc<dyn ActiveHealthCheckPolicy>,
        transport: Arc<dyn ProbeTransport>,
    ) -> ClusterRuntimeHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let runtime = Self {
            cluster,
            destinations,
            policy,
            transport,
        };
        let join = tokio::spawn(runtime.run(stop_rx));
        ClusterRuntimeHandle {
            stop: stop_tx,
            join,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.cluster.health_check.active.interval_secs);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            cluster = %self.cluster.id,
            interval_secs = self.cluster.health_check.active.interval_secs,
            policy = %self.cluster.health_check.active.policy,
            destinations = self.destinations.len(),
            "Active health probing started"
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => {
                    tracing::info!(cluster = %self.cluster.id, "Active health probing stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.probe_round().await;
                }
            }
        }
    }

    /// One tick: probe every destination concurrently, then evaluate the
    /// complete batch with the cluster's policy.
    async fn probe_round(&self) {
        let mut probes = JoinSet::new();
        let mut results = Vec::with_capacity(self.destinations.len());

        for (index, destination) in self.destinations.iter().enumerate() {
            match create_probe_request(&self.cluster, &destination.config) {
                Ok(probe) => {
                    let transport = Arc::clone(&self.transport);
                    probes.spawn(async move { (index, transport.send(probe).await) });
                }
                Err(e) => {
                    // Validation rejects these before a loop starts; fed to
                    // the policy as a failure so the outcome is not dropped.
                    tracing::warn!(
                        cluster = %self.cluster.id,
                        destination = %destination.id,
                        error = %e,
                        "Failed to build probe request"
                    );
                    let outcome = ProbeOutcome::TransportError {
                        kind: TransportErrorKind::Protocol,
                        message: e.to_string(),
                    };
                    metrics::record_probe(&self.cluster.id, &destination.id, &outcome);
                    results.push(ProbeResult {
                        destination_id: destination.id.clone(),
                        current_active: destination.state.active(),
                        outcome,
                    });
                }
            }
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    let destination = &self.destinations[index];
                    metrics::record_probe(&self.cluster.id, &destination.id, &outcome);
                    results.push(ProbeResult {
                        destination_id: destination.id.clone(),
                        current_active: destination.state.active(),
                        outcome,
                    });
                }
                Err(e) => {
                    tracing::error!(cluster = %self.cluster.id, error = %e, "Probe task failed");
                }
            }
        }

        let verdicts = match self.policy.evaluate(&self.cluster, &results) {
            Ok(verdicts) => verdicts,
            Err(e) => {
                tracing::warn!(
                    cluster = %self.cluster.id,
                    error = %e,
                    "Active policy failed, keeping previous health"
                );
                return;
            }
        };

        for verdict in verdicts {
            let Some(destination) = self
                .destinations
                .iter()
                .find(|d| d.id == verdict.destination_id)
            else {
                tracing::debug!(
                    cluster = %self.cluster.id,
                    destination = %verdict.destination_id,
                    "Verdict for unknown destination ignored"
                );
                continue;
            };

            let previous = destination.state.active();
            destination.state.set_active(verdict.active);
            if previous != verdict.active {
                tracing::info!(
                    cluster = %self.cluster.id,
                    destination = %destination.id,
                    from = previous.as_str(),
                    to = verdict.active.as_str(),
                    "Active health changed"
                );
            }
            metrics::record_destination_availability(
                &self.cluster.id,
                &destination.id,
                is_destination_available(&self.cluster.health_check, &destination.state),
            );
        }
    }
}
