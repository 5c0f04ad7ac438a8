//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, policy-name resolution)
//!     → ProxyConfig (validated, immutable)
//!     → applied to the health subsystem as a snapshot
//!
//! On reload signal:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → snapshot sent over a channel
//!     → health subsystem diffs old vs. new and replaces runtimes
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a full new snapshot
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::ClusterConfig;
pub use schema::DestinationConfig;
pub use schema::HealthCheckOptions;
pub use schema::ProxyConfig;
