//! Composite availability rule.
//!
//! Pure function on the per-request hot path: the load balancer calls it for
//! every destination it considers. Reads two atomics and never blocks.

use crate::config::schema::HealthCheckOptions;
use crate::health::state::{DestinationHealthState, HealthStatus};

/// A destination is available iff (active checks disabled OR active health
/// is not unhealthy) AND (passive checks disabled OR passive health is not
/// unhealthy).
///
/// `Unknown` counts as available on both sides, so a freshly added
/// destination is eligible immediately, before its first probe or first
/// passive signal. Only an explicit `Unhealthy` verdict excludes it.
pub fn is_destination_available(
    options: &HealthCheckOptions,
    state: &DestinationHealthState,
) -> bool {
    let active_ok = !options.active.enabled || state.active() != HealthStatus::Unhealthy;
    let passive_ok = !options.passive.enabled || state.passive() != HealthStatus::Unhealthy;
    active_ok && passive_ok
}
