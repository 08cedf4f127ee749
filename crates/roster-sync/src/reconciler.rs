//! Event reconciler — applies pushed events and snapshot merges to the
//! roster store.
//!
//! Snapshots and events race with no barrier between them. The store's
//! origin and tombstone rules make the merge commute; this module adds
//! resync sequencing so a slow, superseded resync cannot undo a newer
//! one.

use roster_state::{Node, NodeId, Origin, Projector, Role, RosterEvent, RosterStore, Snapshot, UpsertOutcome};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::snapshot::SnapshotKind;

/// Result of merging one snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: u32,
    pub refreshed: u32,
    pub suppressed: u32,
    pub pruned: u32,
}

/// Owns the roster store and applies every change to it.
pub struct EventReconciler<P> {
    store: RosterStore<P>,
    /// Latest resync sequence issued per role (worker, server).
    resync_seq: [u64; 2],
}

impl<P: Projector> EventReconciler<P> {
    pub fn new(projector: P) -> Self {
        Self {
            store: RosterStore::new(projector),
            resync_seq: [0; 2],
        }
    }

    pub fn store(&self) -> &RosterStore<P> {
        &self.store
    }

    pub fn into_store(self) -> RosterStore<P> {
        self.store
    }

    /// Apply one pushed event.
    pub fn apply(&mut self, event: RosterEvent) {
        match event {
            RosterEvent::Joined { role, id, hostname } => {
                let node = Node { id, hostname, role };
                if self.store.upsert(role, node, Origin::Event) == UpsertOutcome::Refreshed {
                    debug!(%role, "join for resident node treated as refresh");
                }
            }
            RosterEvent::Left { role, id } => {
                self.store.remove(role, &id);
            }
        }
    }

    /// Open a resync window for `role` and return its sequence number.
    pub fn begin_resync(&mut self, role: Role) -> u64 {
        let seq = &mut self.resync_seq[role.index()];
        *seq += 1;
        self.store.begin_resync(role);
        *seq
    }

    /// Merge a fetched snapshot.
    ///
    /// Returns `None` when the snapshot is superseded: a resync older
    /// than the latest one, or an initial snapshot arriving after any
    /// resync was issued for the role.
    pub fn merge_snapshot(
        &mut self,
        role: Role,
        snapshot: Snapshot,
        kind: SnapshotKind,
    ) -> Option<MergeStats> {
        let latest = self.resync_seq[role.index()];
        match kind {
            SnapshotKind::Resync { seq } if seq != latest => {
                debug!(%role, seq, latest, "dropping superseded resync");
                return None;
            }
            SnapshotKind::Initial if latest > 0 => {
                debug!(%role, latest, "dropping initial snapshot superseded by resync");
                return None;
            }
            _ => {}
        }

        let mut stats = MergeStats::default();
        for (id, details) in &snapshot {
            let node = Node {
                id: id.clone(),
                hostname: details.hostname.clone(),
                role,
            };
            match self.store.upsert(role, node, Origin::Snapshot) {
                UpsertOutcome::Inserted => stats.inserted += 1,
                UpsertOutcome::Refreshed => stats.refreshed += 1,
                UpsertOutcome::Suppressed => stats.suppressed += 1,
            }
        }

        if matches!(kind, SnapshotKind::Resync { .. }) {
            stats.pruned = self.store.prune_absent(role, &snapshot).len() as u32;
        }

        info!(
            %role,
            ?kind,
            inserted = stats.inserted,
            refreshed = stats.refreshed,
            suppressed = stats.suppressed,
            pruned = stats.pruned,
            "snapshot merged"
        );
        Some(stats)
    }

    /// Record a failed fetch. The role keeps whatever events produced.
    pub fn snapshot_failed(&self, role: Role, kind: SnapshotKind, error: &SyncError) {
        warn!(
            %role,
            ?kind,
            error = %error,
            resident = self.store.len(role),
            "snapshot load failed, role continues from event stream"
        );
    }

    pub fn has(&self, role: Role, id: &NodeId) -> bool {
        self.store.has(role, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_state::{NodeDetails, Projection, RecordingProjector};

    fn reconciler() -> EventReconciler<RecordingProjector> {
        EventReconciler::new(RecordingProjector::new())
    }

    fn joined(id: &str, host: &str) -> RosterEvent {
        RosterEvent::Joined {
            role: Role::Worker,
            id: NodeId::from(id),
            hostname: host.to_string(),
        }
    }

    fn left(id: &str) -> RosterEvent {
        RosterEvent::Left {
            role: Role::Worker,
            id: NodeId::from(id),
        }
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

    fn ids(r: &EventReconciler<RecordingProjector>) -> Vec<String> {
        r.store().entries(Role::Worker).map(|n| n.id.to_string()).collect()
    }

    #[test]
    fn join_leave_rejoin_orders_at_tail() {
        let mut r = reconciler();
        r.apply(joined("A", "ha"));
        r.apply(joined("B", "hb"));
        r.apply(left("A"));
        r.apply(joined("A", "ha"));
        assert_eq!(ids(&r), vec!["B", "A"]);
    }

    #[test]
    fn duplicate_join_projects_once() {
        let mut r = reconciler();
        r.apply(joined("A", "ha"));
        r.apply(joined("A", "ha"));
        assert_eq!(r.store().projector().added_count(Role::Worker, "A"), 1);
    }

    #[test]
    fn leave_before_snapshot_never_shows_row() {
        let mut r = reconciler();
        r.apply(left("id1"));
        let stats = r
            .merge_snapshot(Role::Worker, snapshot(&[("id1", "h1")]), SnapshotKind::Initial)
            .unwrap();
        assert_eq!(stats.suppressed, 1);
        assert!(!r.has(Role::Worker, &NodeId::from("id1")));
        assert!(r.store().projector().calls().is_empty());
    }

    #[test]
    fn join_racing_pending_snapshot() {
        let mut r = reconciler();
        // Snapshot {id1: h1} is in flight; id2 joins first.
        r.apply(joined("id2", "h2"));
        r.merge_snapshot(Role::Worker, snapshot(&[("id1", "h1")]), SnapshotKind::Initial);
        r.apply(left("id1"));

        assert_eq!(ids(&r), vec!["id2"]);
        assert_eq!(r.store().get(Role::Worker, &NodeId::from("id2")).unwrap().hostname, "h2");
        assert_eq!(
            r.store().projector().calls(),
            &[
                Projection::added(Role::Worker, "id2", "h2"),
                Projection::added(Role::Worker, "id1", "h1"),
                Projection::removed(Role::Worker, "id1"),
            ]
        );
    }

    #[test]
    fn snapshot_overlapping_events_is_deduplicated() {
        let mut r = reconciler();
        r.apply(joined("id1", "h1"));
        let stats = r
            .merge_snapshot(
                Role::Worker,
                snapshot(&[("id1", "h1"), ("id2", "h2")]),
                SnapshotKind::Initial,
            )
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(r.store().projector().added_count(Role::Worker, "id1"), 1);
    }

    #[test]
    fn superseded_resync_is_dropped() {
        let mut r = reconciler();
        let first = r.begin_resync(Role::Worker);
        let second = r.begin_resync(Role::Worker);
        assert!(second > first);

        let stale = r.merge_snapshot(
            Role::Worker,
            snapshot(&[("gone", "h")]),
            SnapshotKind::Resync { seq: first },
        );
        assert!(stale.is_none());
        assert!(r.store().is_empty(Role::Worker));

        let fresh = r.merge_snapshot(
            Role::Worker,
            snapshot(&[("live", "h")]),
            SnapshotKind::Resync { seq: second },
        );
        assert_eq!(fresh.unwrap().inserted, 1);
    }

    #[test]
    fn resync_prunes_nodes_whose_leave_was_missed() {
        let mut r = reconciler();
        r.merge_snapshot(
            Role::Worker,
            snapshot(&[("a", "h"), ("b", "h")]),
            SnapshotKind::Initial,
        );

        // Channel dropped; "a" left while disconnected. "c" joined right
        // after the reconnect, before the resync response.
        let seq = r.begin_resync(Role::Worker);
        r.apply(joined("c", "hc"));
        let stats = r
            .merge_snapshot(Role::Worker, snapshot(&[("b", "h")]), SnapshotKind::Resync { seq })
            .unwrap();

        assert_eq!(stats.pruned, 1);
        assert_eq!(ids(&r), vec!["b", "c"]);
    }

    #[test]
    fn late_initial_snapshot_cannot_resurrect_pruned_nodes() {
        let mut r = reconciler();
        let seq = r.begin_resync(Role::Worker);
        r.merge_snapshot(Role::Worker, snapshot(&[]), SnapshotKind::Resync { seq })
            .unwrap();

        // Served before "a" left, but delivered after the resync.
        let late = r.merge_snapshot(Role::Worker, snapshot(&[("a", "h")]), SnapshotKind::Initial);
        assert!(late.is_none());
        assert!(!r.has(Role::Worker, &NodeId::from("a")));
        assert!(r.store().projector().calls().is_empty());
    }

    #[test]
    fn initial_snapshot_is_kept_for_roles_without_resync() {
        let mut r = reconciler();
        r.begin_resync(Role::Server);
        let stats = r.merge_snapshot(Role::Worker, snapshot(&[("a", "h")]), SnapshotKind::Initial);
        assert_eq!(stats.unwrap().inserted, 1);
    }

    #[test]
    fn resync_roles_are_sequenced_independently() {
        let mut r = reconciler();
        let worker_seq = r.begin_resync(Role::Worker);
        let server_seq = r.begin_resync(Role::Server);
        assert_eq!(worker_seq, 1);
        assert_eq!(server_seq, 1);
    }
}
