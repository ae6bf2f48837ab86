//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Executor, selector and health monitor produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Router::render_metrics / GET /metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Node address is the common label across logs and metrics
//! - Metrics are cheap and never fail the caller

pub mod logging;
pub mod metrics;
