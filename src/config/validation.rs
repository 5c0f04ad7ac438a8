//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that configured health policies exist in the registry
//! - Check that destination addresses parse
//! - Validate value ranges (intervals and timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runs before a snapshot is accepted into the system, so a bad cluster
//!   never gets a probing loop and passive policies are resolved before
//!   traffic flows, not discovered lazily per request

use crate::config::schema::{ClusterConfig, ProxyConfig};
use crate::health::policy::PolicyRegistry;
use thiserror::Error;
use url::Url;

/// A single semantic problem found in a configuration snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("duplicate cluster id '{0}'")]
    DuplicateCluster(String),

    #[error("cluster '{cluster}', destination '{destination}': unparseable address '{address}'")]
    InvalidAddress {
        cluster: String,
        destination: String,
        address: String,
    },

    #[error("cluster '{cluster}': active health checks enabled but no probe timeout configured")]
    MissingProbeTimeout { cluster: String },

    #[error("cluster '{cluster}': active health check interval must be greater than zero")]
    ZeroProbeInterval { cluster: String },

    #[error("cluster '{cluster}': active health check timeout must be greater than zero")]
    ZeroProbeTimeout { cluster: String },

    #[error("cluster '{cluster}': unknown active health check policy '{policy}'")]
    UnknownActivePolicy { cluster: String, policy: String },

    #[error("cluster '{cluster}': unknown passive health check policy '{policy}'")]
    UnknownPassivePolicy { cluster: String, policy: String },

    #[error("cluster '{cluster}': passive reactivation period must be greater than zero")]
    ZeroReactivationPeriod { cluster: String },
}

/// Validate a full configuration snapshot.
pub fn validate_config(
    config: &ProxyConfig,
    registry: &PolicyRegistry,
) -> Result<(), Vec<ValidationError>> {
    validate_clusters(&config.clusters, registry)
}

/// Validate the cluster set of a snapshot. Collects every error rather than
/// stopping at the first.
pub fn validate_clusters(
    clusters: &[ClusterConfig],
    registry: &PolicyRegistry,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for cluster in clusters {
        if !seen.insert(cluster.id.as_str()) {
            errors.push(ValidationError::DuplicateCluster(cluster.id.clone()));
        }

        for (destination_id, destination) in &cluster.destinations {
            for address in std::iter::once(&destination.address).chain(destination.health.iter()) {
                if Url::parse(address).is_err() {
                    errors.push(ValidationError::InvalidAddress {
                        cluster: cluster.id.clone(),
                        destination: destination_id.clone(),
                        address: address.clone(),
                    });
                }
            }
        }

        let active = &cluster.health_check.active;
        if active.enabled {
            if active.interval_secs == 0 {
                errors.push(ValidationError::ZeroProbeInterval {
                    cluster: cluster.id.clone(),
                });
            }
            match active.timeout_secs {
                None => errors.push(ValidationError::MissingProbeTimeout {
                    cluster: cluster.id.clone(),
                }),
                Some(0) => errors.push(ValidationError::ZeroProbeTimeout {
                    cluster: cluster.id.clone(),
                }),
                Some(_) => {}
            }
            if !registry.has_active(&active.policy) {
                errors.push(ValidationError::UnknownActivePolicy {
                    cluster: cluster.id.clone(),
                    policy: active.policy.clone(),
                });
            }
        }

        let passive = &cluster.health_check.passive;
        if passive.enabled {
            if passive.reactivation_period_secs == 0 {
                errors.push(ValidationError::ZeroReactivationPeriod {
                    cluster: cluster.id.clone(),
                });
            }
            if !registry.has_passive(&passive.policy) {
                errors.push(ValidationError::UnknownPassivePolicy {
                    cluster: cluster.id.clone(),
                    policy: passive.policy.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DestinationConfig;

    fn cluster(id: &str) -> ClusterConfig {
        ClusterConfig {
            id: id.to_string(),
            destinations: HashMap::new(),
            health_check: Default::default(),
            outgoing_request: Default::default(),
            load_balancing_policy: None,
            session_affinity: None,
            metadata: HashMap::new(),
        }
    }

    use std::collections::HashMap;

    #[test]
    fn empty_config_is_valid() {
        let registry = PolicyRegistry::default();
        assert!(validate_clusters(&[], &registry).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let registry = PolicyRegistry::default();
        let mut bad = cluster("api");
        bad.destinations.insert(
            "d1".to_string(),
            DestinationConfig {
                address: "not a uri".to_string(),
                health: None,
                metadata: HashMap::new(),
            },
        );
        bad.health_check.active.enabled = true;
        bad.health_check.active.policy = "no_such_policy".to_string();
        // timeout left unset on purpose

        let errors = validate_clusters(&[bad], &registry).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidAddress { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MissingProbeTimeout { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownActivePolicy { .. })));
    }

    #[test]
    fn rejects_unknown_passive_policy() {
        let registry = PolicyRegistry::default();
        let mut bad = cluster("api");
        bad.health_check.passive.enabled = true;
        bad.health_check.passive.policy = "nope".to_string();

        let errors = validate_clusters(&[bad], &registry).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnknownPassivePolicy {
                cluster: "api".to_string(),
                policy: "nope".to_string(),
            }]
        );
    }

    #[test]
    fn rejects_duplicate_cluster_ids() {
        let registry = PolicyRegistry::default();
        let errors = validate_clusters(&[cluster("api"), cluster("api")], &registry).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateCluster("api".to_string())]
        );
    }

    #[test]
    fn accepts_builtin_policies() {
        let registry = PolicyRegistry::default();
        let mut good = cluster("api");
        good.health_check.active.enabled = true;
        good.health_check.active.timeout_secs = Some(5);
        good.health_check.passive.enabled = true;
        assert!(validate_clusters(&[good], &registry).is_ok());
    }
}
