//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Router::start:
//!     Initial health check → spawn monitor subscribed to shutdown.rs
//!
//! Router::stop (shutdown.rs):
//!     Trigger → monitor exits → pools closed
//!
//! Binary (signals.rs):
//!     SIGTERM/SIGINT → admin server drains → Router::stop
//! ```
//!
//! # Design Decisions
//! - Shutdown is one-way: a stopped router is never restarted
//! - Ordered shutdown: stop probing, then close pools

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
