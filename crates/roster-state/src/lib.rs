//! roster-state — in-memory roster of connected cluster nodes.
//!
//! Holds the value types shared by the hub and its clients (node
//! identity, roles, snapshot and event wire formats) and the
//! [`RosterStore`], the authoritative per-role view that the sync
//! engine mutates.
//!
//! # Architecture
//!
//! ```text
//! RosterStore
//!   ├── Partition (worker)
//!   │   ├── entries     NodeId → Node, insertion ordered
//!   │   └── tombstones  ids removed since startup
//!   ├── Partition (server)
//!   └── Projector       added / removed side effects
//! ```
//!
//! The store is single-writer and holds no locks. Every mutation that
//! changes visible state produces exactly one projector call.

pub mod error;
pub mod projector;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use projector::{Projection, Projector, RecordingProjector, TableProjector};
pub use store::{Origin, RosterStore, UpsertOutcome};
pub use types::*;
