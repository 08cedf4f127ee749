//! RosterStore — per-role ordered membership with tombstones.
//!
//! Both the snapshot loader and the event stream write through
//! [`RosterStore::upsert`] and [`RosterStore::remove`]. The rules below
//! make those writes commute, so the final state does not depend on
//! whether the snapshot lands before, between, or after events:
//!
//! - an event upsert clears the id's tombstone and always wins;
//! - a snapshot upsert is dropped for a tombstoned id and never
//!   overwrites an entry last written by an event;
//! - a remove always tombstones the id, present or not.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::projector::{Projector, write_table};
use crate::types::{Node, NodeId, Role, Snapshot};

/// Which source produced a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Snapshot,
    Event,
}

/// What an upsert did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First insertion; `added` was projected.
    Inserted,
    /// Already present; hostname replaced, nothing projected.
    Refreshed,
    /// Dropped: tombstoned, or an event-written entry shadowed a snapshot row.
    Suppressed,
}

impl UpsertOutcome {
    /// Whether an `added` notification fired.
    pub fn is_added(self) -> bool {
        self == UpsertOutcome::Inserted
    }
}

#[derive(Debug)]
struct Entry {
    node: Node,
    origin: Origin,
    /// Written by an event since the last `begin_resync`.
    touched: bool,
}

#[derive(Debug, Default)]
struct Partition {
    entries: IndexMap<NodeId, Entry>,
    tombstones: HashSet<NodeId>,
}

/// Authoritative in-memory roster, partitioned by role.
///
/// Single-writer: callers serialize access (the sync engine owns the
/// store inside one task).
pub struct RosterStore<P> {
    partitions: [Partition; 2],
    projector: P,
}

impl<P: Projector> RosterStore<P> {
    pub fn new(projector: P) -> Self {
        Self {
            partitions: Default::default(),
            projector,
        }
    }

    /// Insert or refresh `node` in `role`.
    ///
    /// Projects `added` only on first insertion of the id.
    pub fn upsert(&mut self, role: Role, node: Node, origin: Origin) -> UpsertOutcome {
        debug_assert_eq!(role, node.role, "node role does not match partition");
        let partition = &mut self.partitions[role.index()];

        match origin {
            Origin::Event => {
                partition.tombstones.remove(&node.id);
            }
            Origin::Snapshot => {
                if partition.tombstones.contains(&node.id) {
                    debug!(%role, id = %node.id, "snapshot row suppressed by tombstone");
                    return UpsertOutcome::Suppressed;
                }
            }
        }

        if let Some(entry) = partition.entries.get_mut(&node.id) {
            if origin == Origin::Snapshot && entry.origin == Origin::Event {
                debug!(%role, id = %node.id, "snapshot row shadowed by event");
                return UpsertOutcome::Suppressed;
            }
            entry.node = node;
            entry.origin = origin;
            entry.touched |= origin == Origin::Event;
            return UpsertOutcome::Refreshed;
        }

        self.projector.added(role, &node.id, &node.hostname);
        debug!(%role, id = %node.id, hostname = %node.hostname, ?origin, "node inserted");
        partition.entries.insert(
            node.id.clone(),
            Entry {
                node,
                origin,
                touched: origin == Origin::Event,
            },
        );
        UpsertOutcome::Inserted
    }

    /// Remove `id` from `role` and tombstone it.
    ///
    /// Absent ids are not an error; the tombstone still suppresses a
    /// late snapshot row. Returns whether an entry was removed.
    pub fn remove(&mut self, role: Role, id: &NodeId) -> bool {
        let partition = &mut self.partitions[role.index()];
        partition.tombstones.insert(id.clone());

        match partition.entries.shift_remove(id) {
            Some(_) => {
                self.projector.removed(role, id);
                debug!(%role, %id, "node removed");
                true
            }
            None => {
                debug!(%role, %id, "remove for unknown node, tombstoned");
                false
            }
        }
    }

    pub fn has(&self, role: Role, id: &NodeId) -> bool {
        self.partitions[role.index()].entries.contains_key(id)
    }

    pub fn get(&self, role: Role, id: &NodeId) -> Option<&Node> {
        self.partitions[role.index()].entries.get(id).map(|e| &e.node)
    }

    /// Nodes of `role` in acceptance order.
    pub fn entries(&self, role: Role) -> impl Iterator<Item = &Node> {
        self.partitions[role.index()].entries.values().map(|e| &e.node)
    }

    pub fn len(&self, role: Role) -> usize {
        self.partitions[role.index()].entries.len()
    }

    pub fn is_empty(&self, role: Role) -> bool {
        self.partitions[role.index()].entries.is_empty()
    }

    pub fn is_tombstoned(&self, role: Role, id: &NodeId) -> bool {
        self.partitions[role.index()].tombstones.contains(id)
    }

    /// Start a resync window for `role`: forget which entries events
    /// have written, so [`RosterStore::prune_absent`] can tell entries
    /// confirmed since the connection from stale ones.
    pub fn begin_resync(&mut self, role: Role) {
        for entry in self.partitions[role.index()].entries.values_mut() {
            entry.touched = false;
        }
    }

    /// Remove entries missing from `snapshot` that no event has written
    /// since [`RosterStore::begin_resync`]. Pruned ids are not tombstoned.
    pub fn prune_absent(&mut self, role: Role, snapshot: &Snapshot) -> Vec<NodeId> {
        let partition = &mut self.partitions[role.index()];
        let stale: Vec<NodeId> = partition
            .entries
            .iter()
            .filter(|(id, entry)| !entry.touched && !snapshot.contains_key(*id))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            partition.entries.shift_remove(id);
            self.projector.removed(role, id);
            debug!(%role, %id, "stale node pruned by resync");
        }
        stale
    }

    /// Current roster as a text table per role, with the latest
    /// hostname of every entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for role in Role::ALL {
            let rows: Vec<(&NodeId, &str)> = self
                .entries(role)
                .map(|node| (&node.id, node.hostname.as_str()))
                .collect();
            write_table(&mut out, role, &rows);
        }
        out
    }

    pub fn projector(&self) -> &P {
        &self.projector
    }

    pub fn projector_mut(&mut self) -> &mut P {
        &mut self.projector
    }

    pub fn into_projector(self) -> P {
        self.projector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::{Projection, RecordingProjector, TableProjector};
    use crate::types::NodeDetails;

    fn store() -> RosterStore<RecordingProjector> {
        RosterStore::new(RecordingProjector::new())
    }

    fn worker(id: &str, host: &str) -> Node {
        Node::new(id, host, Role::Worker)
    }

    fn ids(store: &RosterStore<RecordingProjector>, role: Role) -> Vec<String> {
        store.entries(role).map(|n| n.id.to_string()).collect()
    }

    fn snapshot(rows: &[(&str, &str)]) -> Snapshot {
        rows.iter()
            .map(|(id, host)| {
                (
                    NodeId::from(*id),
                    NodeDetails {
                        hostname: host.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn upsert_twice_projects_once() {
        let mut store = store();
        assert!(store.upsert(Role::Worker, worker("a", "h"), Origin::Event).is_added());
        assert_eq!(
            store.upsert(Role::Worker, worker("a", "h"), Origin::Event),
            UpsertOutcome::Refreshed
        );
        assert_eq!(store.len(Role::Worker), 1);
        assert_eq!(store.projector().calls().len(), 1);
    }

    #[test]
    fn remove_absent_is_silent() {
        let mut store = store();
        assert!(!store.remove(Role::Worker, &NodeId::from("nope")));
        assert!(store.is_empty(Role::Worker));
        assert!(store.projector().calls().is_empty());
    }

    #[test]
    fn event_join_refreshes_hostname() {
        let mut store = store();
        store.upsert(Role::Worker, worker("a", "old"), Origin::Snapshot);
        store.upsert(Role::Worker, worker("a", "new"), Origin::Event);
        assert_eq!(store.get(Role::Worker, &NodeId::from("a")).unwrap().hostname, "new");
    }

    #[test]
    fn render_shows_refreshed_hostname() {
        let mut store = RosterStore::new(TableProjector::new());
        store.upsert(Role::Worker, worker("0123456789", "old-host"), Origin::Snapshot);
        store.upsert(Role::Worker, worker("0123456789", "new-host"), Origin::Event);

        let text = store.render();
        assert!(text.contains("WORKERS (1)"));
        assert!(text.contains("01234567  new-host"));
        assert!(!text.contains("old-host"));
        assert!(text.contains("SERVERS (0)"));
    }

    #[test]
    fn snapshot_does_not_overwrite_event_entry() {
        let mut store = store();
        store.upsert(Role::Worker, worker("a", "fresh"), Origin::Event);
        assert_eq!(
            store.upsert(Role::Worker, worker("a", "stale"), Origin::Snapshot),
            UpsertOutcome::Suppressed
        );
        assert_eq!(store.get(Role::Worker, &NodeId::from("a")).unwrap().hostname, "fresh");
    }

    #[test]
    fn snapshot_refreshes_snapshot_entry() {
        let mut store = store();
        store.upsert(Role::Worker, worker("a", "h1"), Origin::Snapshot);
        store.upsert(Role::Worker, worker("a", "h2"), Origin::Snapshot);
        assert_eq!(store.get(Role::Worker, &NodeId::from("a")).unwrap().hostname, "h2");
    }

    #[test]
    fn leave_before_snapshot_suppresses_row() {
        let mut store = store();
        store.remove(Role::Worker, &NodeId::from("a"));
        assert!(store.is_tombstoned(Role::Worker, &NodeId::from("a")));

        let outcome = store.upsert(Role::Worker, worker("a", "h"), Origin::Snapshot);
        assert_eq!(outcome, UpsertOutcome::Suppressed);
        assert!(!store.has(Role::Worker, &NodeId::from("a")));
        assert_eq!(store.projector().added_count(Role::Worker, "a"), 0);
    }

    #[test]
    fn join_after_leave_clears_tombstone() {
        let mut store = store();
        store.remove(Role::Worker, &NodeId::from("a"));
        store.upsert(Role::Worker, worker("a", "h"), Origin::Event);
        assert!(store.has(Role::Worker, &NodeId::from("a")));
        assert!(!store.is_tombstoned(Role::Worker, &NodeId::from("a")));
    }

    #[test]
    fn rejoin_goes_to_tail() {
        let mut store = store();
        store.upsert(Role::Worker, worker("A", "h"), Origin::Event);
        store.upsert(Role::Worker, worker("B", "h"), Origin::Event);
        store.remove(Role::Worker, &NodeId::from("A"));
        store.upsert(Role::Worker, worker("A", "h"), Origin::Event);
        assert_eq!(ids(&store, Role::Worker), vec!["B", "A"]);
    }

    #[test]
    fn roles_are_independent() {
        let mut store = store();
        store.upsert(Role::Worker, worker("a", "h"), Origin::Event);
        store.remove(Role::Server, &NodeId::from("a"));
        assert!(store.has(Role::Worker, &NodeId::from("a")));
        assert!(!store.is_tombstoned(Role::Worker, &NodeId::from("a")));
        assert!(store.is_tombstoned(Role::Server, &NodeId::from("a")));
    }

    #[test]
    fn merge_commutes_with_event_sequence() {
        // Sequences ending in join and ending in leave, each merged with
        // snapshot row ("a", "snap") before and after.
        let sequences: Vec<Vec<Option<&str>>> = vec![
            vec![Some("e1")],
            vec![None],
            vec![Some("e1"), None],
            vec![None, Some("e2")],
            vec![Some("e1"), None, Some("e3")],
        ];

        for seq in sequences {
            let run = |snapshot_first: bool| {
                let mut store = store();
                if snapshot_first {
                    store.upsert(Role::Worker, worker("a", "snap"), Origin::Snapshot);
                }
                for step in &seq {
                    match step {
                        Some(host) => {
                            store.upsert(Role::Worker, worker("a", host), Origin::Event);
                        }
                        None => {
                            store.remove(Role::Worker, &NodeId::from("a"));
                        }
                    }
                }
                if !snapshot_first {
                    store.upsert(Role::Worker, worker("a", "snap"), Origin::Snapshot);
                }
                store
                    .get(Role::Worker, &NodeId::from("a"))
                    .map(|n| n.hostname.clone())
            };
            assert_eq!(run(true), run(false), "sequence {seq:?}");
        }
    }

    #[test]
    fn prune_removes_untouched_absent_entries() {
        let mut store = store();
        store.upsert(Role::Worker, worker("kept", "h"), Origin::Snapshot);
        store.upsert(Role::Worker, worker("stale", "h"), Origin::Event);
        store.upsert(Role::Worker, worker("rejoined", "h"), Origin::Event);

        store.begin_resync(Role::Worker);
        store.upsert(Role::Worker, worker("rejoined", "h2"), Origin::Event);

        let pruned = store.prune_absent(Role::Worker, &snapshot(&[("kept", "h")]));
        assert_eq!(pruned, vec![NodeId::from("stale")]);
        assert_eq!(ids(&store, Role::Worker), vec!["kept", "rejoined"]);
        assert!(!store.is_tombstoned(Role::Worker, &NodeId::from("stale")));
        assert_eq!(
            store.projector().calls().last(),
            Some(&Projection::removed(Role::Worker, "stale"))
        );
    }
}
