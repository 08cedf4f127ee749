//! roster-sync — keeps a local roster in step with the hub.
//!
//! Reconciles a one-shot snapshot per role with the hub's stream of
//! join/leave events. The two arrive in any order; the result converges
//! to the hub's membership without duplicate or ghost rows.
//!
//! # Components
//!
//! - **`snapshot`** — snapshot sources and the loader that fetches them
//! - **`reconciler`** — applies events and snapshot merges to the store
//! - **`engine`** — single-writer loop draining the message queue
//! - **`channel`** — reconnecting SSE subscription to the event feed
//! - **`agent`** — node-side registration and command listening
//! - **`client`**, **`sse`** — hyper client helpers and frame decoding

pub mod agent;
pub mod channel;
pub mod client;
pub mod engine;
pub mod error;
pub mod reconciler;
pub mod snapshot;
pub mod sse;

pub use agent::{AgentConfig, NodeAgent};
pub use channel::{ChannelConfig, ChannelEvent, PushChannel};
pub use engine::{EngineConfig, EngineMessage, RosterEngine};
pub use error::{SyncError, SyncResult};
pub use reconciler::{EventReconciler, MergeStats};
pub use snapshot::{HttpSnapshotSource, SnapshotKind, SnapshotLoader, SnapshotSource};
