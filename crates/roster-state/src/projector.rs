//! View projector — the boundary between the roster and its display.
//!
//! The store calls a [`Projector`] once for every visible change it
//! accepts. Implementations must tolerate a `removed` for a row they do
//! not have, and must key rows by the full [`NodeId`].

use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::types::{NodeId, Role};

/// Receives roster changes.
pub trait Projector {
    /// A node became visible in `role`.
    fn added(&mut self, role: Role, id: &NodeId, hostname: &str);

    /// A node left `role`.
    fn removed(&mut self, role: Role, id: &NodeId);
}

impl<P: Projector + ?Sized> Projector for &mut P {
    fn added(&mut self, role: Role, id: &NodeId, hostname: &str) {
        (**self).added(role, id, hostname);
    }

    fn removed(&mut self, role: Role, id: &NodeId) {
        (**self).removed(role, id);
    }
}

impl<P: Projector + ?Sized> Projector for Box<P> {
    fn added(&mut self, role: Role, id: &NodeId, hostname: &str) {
        (**self).added(role, id, hostname);
    }

    fn removed(&mut self, role: Role, id: &NodeId) {
        (**self).removed(role, id);
    }
}

// ── Recording ──────────────────────────────────────────────────────

/// One projector call, as recorded by [`RecordingProjector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Added {
        role: Role,
        id: NodeId,
        hostname: String,
    },
    Removed {
        role: Role,
        id: NodeId,
    },
}

impl Projection {
    pub fn added(role: Role, id: &str, hostname: &str) -> Self {
        Projection::Added {
            role,
            id: NodeId::from(id),
            hostname: hostname.to_string(),
        }
    }

    pub fn removed(role: Role, id: &str) -> Self {
        Projection::Removed {
            role,
            id: NodeId::from(id),
        }
    }
}

/// Records every call in order. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingProjector {
    calls: Vec<Projection>,
}

impl RecordingProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[Projection] {
        &self.calls
    }

    /// Number of `added` calls seen for `id` in `role`.
    pub fn added_count(&self, role: Role, id: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Projection::Added { role: r, id: i, .. } if *r == role && i.as_str() == id))
            .count()
    }
}

impl Projector for RecordingProjector {
    fn added(&mut self, role: Role, id: &NodeId, hostname: &str) {
        self.calls.push(Projection::Added {
            role,
            id: id.clone(),
            hostname: hostname.to_string(),
        });
    }

    fn removed(&mut self, role: Role, id: &NodeId) {
        self.calls.push(Projection::Removed {
            role,
            id: id.clone(),
        });
    }
}

// ── Table ──────────────────────────────────────────────────────────

/// Ordered rows per role, rendered as a plain-text table.
///
/// Adding a row that exists and removing one that does not are both
/// no-ops. New rows go to the tail of their table. A row keeps the
/// hostname it was added with; [`RosterStore::render`] shows refreshed
/// hostnames.
///
/// [`RosterStore::render`]: crate::store::RosterStore::render
#[derive(Debug, Default)]
pub struct TableProjector {
    tables: HashMap<Role, IndexMap<NodeId, String>>,
}

impl TableProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of one role as `(id, hostname)`, in display order.
    pub fn rows(&self, role: Role) -> Vec<(&NodeId, &str)> {
        self.tables
            .get(&role)
            .map(|t| t.iter().map(|(id, host)| (id, host.as_str())).collect())
            .unwrap_or_default()
    }

    /// Render every role as a small text table, short ids only.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for role in Role::ALL {
            write_table(&mut out, role, &self.rows(role));
        }
        out
    }
}

/// Append one role's table: a `ROLES (n)` heading, then one line per row.
pub(crate) fn write_table(out: &mut String, role: Role, rows: &[(&NodeId, &str)]) {
    let _ = writeln!(out, "{} ({})", role.plural().to_uppercase(), rows.len());
    for (id, hostname) in rows {
        let _ = writeln!(out, "  {:<8}  {}", id.short(), hostname);
    }
}

impl Projector for TableProjector {
    fn added(&mut self, role: Role, id: &NodeId, hostname: &str) {
        let table = self.tables.entry(role).or_default();
        if table.contains_key(id) {
            debug!(%role, %id, "row already displayed");
            return;
        }
        table.insert(id.clone(), hostname.to_string());
        info!(%role, id = id.short(), %hostname, "node row added");
    }

    fn removed(&mut self, role: Role, id: &NodeId) {
        let removed = self
            .tables
            .get_mut(&role)
            .and_then(|t| t.shift_remove(id))
            .is_some();
        if removed {
            info!(%role, id = id.short(), "node row removed");
        } else {
            debug!(%role, %id, "no row to remove");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_add_is_idempotent() {
        let mut table = TableProjector::new();
        let id = NodeId::from("id1");
        table.added(Role::Worker, &id, "h1");
        table.added(Role::Worker, &id, "h1");
        assert_eq!(table.rows(Role::Worker).len(), 1);
    }

    #[test]
    fn table_remove_unknown_row_is_noop() {
        let mut table = TableProjector::new();
        table.removed(Role::Server, &NodeId::from("ghost"));
        assert!(table.rows(Role::Server).is_empty());
    }

    #[test]
    fn table_keeps_insertion_order_and_keys_by_full_id() {
        let mut table = TableProjector::new();
        // Same 8-char prefix, different nodes.
        table.added(Role::Worker, &NodeId::from("abcdefgh-1"), "h1");
        table.added(Role::Worker, &NodeId::from("abcdefgh-2"), "h2");
        table.added(Role::Worker, &NodeId::from("00000000-3"), "h3");
        table.removed(Role::Worker, &NodeId::from("abcdefgh-1"));

        let hosts: Vec<&str> = table.rows(Role::Worker).into_iter().map(|(_, h)| h).collect();
        assert_eq!(hosts, vec!["h2", "h3"]);
    }

    #[test]
    fn render_shows_short_ids_per_role() {
        let mut table = TableProjector::new();
        table.added(Role::Server, &NodeId::from("0123456789abcdef"), "db-1");
        let text = table.render();
        assert!(text.contains("WORKERS (0)"));
        assert!(text.contains("SERVERS (1)"));
        assert!(text.contains("01234567  db-1"));
        assert!(!text.contains("89abcdef"));
    }

    #[test]
    fn recording_projector_through_mut_ref() {
        fn feed(mut projector: impl Projector) {
            projector.added(Role::Worker, &NodeId::from("id1"), "h1");
            projector.removed(Role::Worker, &NodeId::from("id1"));
        }

        let mut recorder = RecordingProjector::new();
        feed(&mut recorder);
        assert_eq!(
            recorder.calls(),
            &[
                Projection::added(Role::Worker, "id1", "h1"),
                Projection::removed(Role::Worker, "id1"),
            ]
        );
        assert_eq!(recorder.added_count(Role::Worker, "id1"), 1);
    }
}
