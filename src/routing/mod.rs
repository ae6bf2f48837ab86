//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming statement (sql, options)
//!     → classifier.rs (Read or Write)
//!     → selector.rs (primary, or an eligible replica per read preference)
//!     → Return: the NodeState that should execute it
//! ```
//!
//! # Design Decisions
//! - Classification is pure and total: every string is Read or Write
//! - Selection reads node state but only mutates it through the lazy
//!   circuit close
//! - Deterministic for writes: always the primary

pub mod classifier;
pub mod selector;

pub use classifier::{classify, QueryKind};
pub use selector::NodeSelector;
