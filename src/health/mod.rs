//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration snapshot (config::*)
//!     → system.rs (diff clusters, start/stop probing loops)
//!     → active.rs (periodic loop per cluster)
//!     → probe.rs (build probe request)
//!     → transport.rs (send, classify outcome)
//!     → policy.rs (batch evaluation)
//!     → state.rs (atomic health updates)
//!
//! Proxied request completes:
//!     transport outcome
//!     → system.rs report_request (passive hook)
//!     → policy.rs (single-outcome evaluation)
//!     → state.rs (+ reactivation timer)
//!
//! Load balancer, per request:
//!     availability.rs (composite rule over state.rs)
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary and enable independently
//! - Health state is per destination, in memory, rebuilt from scratch on
//!   restart
//! - Policies are resolved by name from a registry; unknown names are
//!   rejected when the snapshot is validated, never discovered per request

pub mod active;
pub mod availability;
pub mod passive;
pub mod policy;
pub mod probe;
pub mod state;
pub mod system;
pub mod transport;

pub use availability::is_destination_available;
pub use passive::RequestOutcome;
pub use policy::PolicyRegistry;
pub use state::HealthStatus;
pub use system::HealthCheckSystem;
pub use transport::{HttpProbeTransport, ProbeOutcome, ProbeTransport};
