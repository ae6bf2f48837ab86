//! Primary/replica query router for PostgreSQL.
//!
//! Sends writes to the primary, spreads reads over healthy replicas whose
//! replication lag is within bounds, and stops routing to nodes that keep
//! failing.
//!
//! ```text
//!   query(sql, params, options)          transaction(f)
//!            │                                 │
//!            ▼                                 │
//!   routing::classifier ── Read/Write          │
//!            │                                 │
//!            ▼                                 ▼
//!   routing::selector ◀── NodeState ──▶ query::transaction (primary only)
//!            │            (health, lag,        │
//!            ▼             breaker, pool)      │
//!   query::executor ──────────┬────────────────┘
//!                             ▼
//!                      pool::NodePool ──▶ postgres / memory
//!
//!   health::active (timer) ──▶ NodeState        observability::metrics
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod pool;
pub mod query;
pub mod resilience;
pub mod router;
pub mod routing;

pub use config::{NodeConfig, ReadPreference, RouterConfig, ServiceConfig};
pub use error::{DbError, RouterError};
pub use load_balancer::node::{NodeRole, NodeStats};
pub use pool::{QueryResult, Row, SqlValue};
pub use query::{QueryOptions, TxConnection};
pub use router::Router;
pub use routing::{classify, QueryKind};
