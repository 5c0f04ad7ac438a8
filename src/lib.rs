//! Backend-health subsystem of a reverse proxy.
//!
//! Decides, continuously and per destination, whether a backend server is
//! eligible to receive proxied traffic: an independent probing loop per
//! traffic cluster, passive observation of real traffic outcomes, pluggable
//! decision policies, hot reload of cluster topology, and the composite
//! availability rule the destination-selection path reads on every request.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use health::HealthCheckSystem;
pub use lifecycle::Shutdown;
