//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → RouterConfig handed to Router::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; node states are built from it once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The router itself never reads files or the environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AdminConfig;
pub use schema::NodeConfig;
pub use schema::ObservabilityConfig;
pub use schema::ReadPreference;
pub use schema::RouterConfig;
pub use schema::ServiceConfig;
