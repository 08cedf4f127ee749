//! Domain and wire types for the roster.
//!
//! Everything here is shared between the hub (which serializes it) and
//! the sync engine (which deserializes it), so the serde layout is the
//! wire format.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

// ── Identity ───────────────────────────────────────────────────────

/// Opaque, server-assigned node identifier.
///
/// Compared for equality only. The short form returned by
/// [`NodeId::short`] is for display and must never be used as a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Number of characters shown by [`NodeId::short`].
pub const SHORT_ID_LEN: usize = 8;

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form: the first [`SHORT_ID_LEN`] characters.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ── Role ───────────────────────────────────────────────────────────

/// Partition of the roster a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Worker,
    Server,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Worker, Role::Server];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Server => "server",
        }
    }

    /// Dense index, for per-role arrays.
    pub fn index(self) -> usize {
        match self {
            Role::Worker => 0,
            Role::Server => 1,
        }
    }

    /// Plural form used in route segments and page headings.
    pub fn plural(self) -> &'static str {
        match self {
            Role::Worker => "workers",
            Role::Server => "servers",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" | "workers" => Ok(Role::Worker),
            "server" | "servers" => Ok(Role::Server),
            other => Err(StateError::UnknownRole(other.to_string())),
        }
    }
}

// ── Node ───────────────────────────────────────────────────────────

/// A cluster member as shown in the roster.
///
/// Immutable once built: a node reappearing under the same id replaces
/// the previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    pub role: Role,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, hostname: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            role,
        }
    }
}

/// Per-node details carried in a snapshot row.
///
/// Unknown fields are ignored; a missing `hostname` makes the row (and
/// the whole document) malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    pub hostname: String,
}

/// Full membership of one role, in the order the hub listed it.
pub type Snapshot = IndexMap<NodeId, NodeDetails>;

// ── Events ─────────────────────────────────────────────────────────

/// Incremental membership change pushed by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RosterEvent {
    Joined {
        role: Role,
        id: NodeId,
        hostname: String,
    },
    Left {
        role: Role,
        id: NodeId,
    },
}

impl RosterEvent {
    pub fn role(&self) -> Role {
        match self {
            RosterEvent::Joined { role, .. } | RosterEvent::Left { role, .. } => *role,
        }
    }

    pub fn id(&self) -> &NodeId {
        match self {
            RosterEvent::Joined { id, .. } | RosterEvent::Left { id, .. } => id,
        }
    }

    /// Event name used on the push channel.
    pub fn name(&self) -> &'static str {
        match self {
            RosterEvent::Joined { .. } => "joined",
            RosterEvent::Left { .. } => "left",
        }
    }
}

/// One-off command broadcast to every listening node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Monotonic sequence number assigned by the hub.
    pub seq: u64,
    pub name: String,
}
