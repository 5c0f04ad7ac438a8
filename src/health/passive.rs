//! Passive health checking (real-traffic observation).
//!
//! # Responsibilities
//! - Carry the structured outcome of a proxied request to the cluster's
//!   passive policy
//! - Give the policy a narrow handle for marking passive health and arming
//!   the reactivation timer
//!
//! # Design Decisions
//! - Runs synchronously on the request-completion path: an in-memory state
//!   update and timer scheduling, no I/O
//! - A faulting policy is logged and treated as "no change"; the request
//!   path never crashes on it

use crate::config::schema::ClusterConfig;
use crate::health::policy::PassiveHealthCheckPolicy;
use crate::health::state::{DestinationHealthState, HealthStatus};
use crate::health::transport::TransportErrorKind;
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// How a proxied request to a destination ended.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// The destination produced a response with this status.
    Response { status: StatusCode },
    /// The exchange failed below the HTTP layer.
    TransportError { kind: TransportErrorKind },
}

/// Handle a passive policy uses to act on one destination's health.
///
/// The policy may mark passive health and request the reactivation cooldown;
/// it cannot touch active health or other destinations.
pub struct PassiveHealthContext<'a> {
    state: &'a Arc<DestinationHealthState>,
    reactivation_period: Duration,
}

impl<'a> PassiveHealthContext<'a> {
    pub fn passive(&self) -> HealthStatus {
        self.state.passive()
    }

    pub fn mark(&self, status: HealthStatus) {
        self.state.set_passive(status);
    }

    /// Arm the reactivation timer with the cluster's configured period,
    /// cancelling any previously armed one.
    pub fn schedule_reactivation(&self) {
        self.state.schedule_reactivation(self.reactivation_period);
    }
}

/// Deliver one proxied-request outcome to the cluster's passive policy.
///
/// Callers have already checked that passive checks are enabled and that a
/// destination was actually selected for the request.
pub(crate) fn dispatch(
    policy: &Arc<dyn PassiveHealthCheckPolicy>,
    cluster: &ClusterConfig,
    destination_id: &str,
    state: &Arc<DestinationHealthState>,
    outcome: &RequestOutcome,
) {
    let context = PassiveHealthContext {
        state,
        reactivation_period: Duration::from_secs(
            cluster.health_check.passive.reactivation_period_secs,
        ),
    };

    if let Err(e) = policy.request_proxied(cluster, destination_id, outcome, &context) {
        tracing::warn!(
            cluster = %cluster.id,
            destination = %destination_id,
            error = %e,
            "Passive policy failed, keeping previous health"
        );
    }
}
