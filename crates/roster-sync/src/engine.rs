//! Roster engine — the single writer.
//!
//! Snapshot fetch tasks and the push channel are producers; they only
//! send [`EngineMessage`]s. The engine loop is the one consumer and the
//! only code that mutates the roster, so no lock guards it.
//!
//! ```text
//! SnapshotLoader (per role) ──┐
//!                             ├──► mpsc ──► RosterEngine ──► RosterStore ──► Projector
//! PushChannel (SSE) ──────────┘
//! ```

use roster_state::{Projector, Role, RosterStore, Snapshot};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, PushChannel};
use crate::error::SyncResult;
use crate::reconciler::EventReconciler;
use crate::snapshot::{SnapshotKind, SnapshotLoader, SnapshotSource};

/// Work item for the engine loop.
#[derive(Debug)]
pub enum EngineMessage {
    Snapshot {
        role: Role,
        kind: SnapshotKind,
        result: SyncResult<Snapshot>,
    },
    Channel(ChannelEvent),
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Roles whose rosters are tracked. Events for other roles are ignored.
    pub roles: Vec<Role>,
    /// Bound of the message queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            roles: Role::ALL.to_vec(),
            queue_capacity: 256,
        }
    }
}

/// Reconciles snapshots and pushed events into one roster.
pub struct RosterEngine<P> {
    reconciler: EventReconciler<P>,
    roles: Vec<Role>,
    tx: mpsc::Sender<EngineMessage>,
    rx: mpsc::Receiver<EngineMessage>,
    connected_once: bool,
}

impl<P: Projector> RosterEngine<P> {
    pub fn new(projector: P, config: &EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            reconciler: EventReconciler::new(projector),
            roles: config.roles.clone(),
            tx,
            rx,
            connected_once: false,
        }
    }

    /// Producer handle for the engine queue.
    pub fn sender(&self) -> mpsc::Sender<EngineMessage> {
        self.tx.clone()
    }

    pub fn store(&self) -> &RosterStore<P> {
        self.reconciler.store()
    }

    /// Apply one message.
    ///
    /// Returns the snapshot fetches the message calls for (one resync
    /// per tracked role on each connection); the caller launches them.
    pub fn step(&mut self, msg: EngineMessage) -> Vec<(Role, SnapshotKind)> {
        match msg {
            EngineMessage::Snapshot { role, kind, result } => {
                match result {
                    Ok(snapshot) => {
                        self.reconciler.merge_snapshot(role, snapshot, kind);
                    }
                    Err(e) => self.reconciler.snapshot_failed(role, kind, &e),
                }
                Vec::new()
            }
            EngineMessage::Channel(ChannelEvent::Connected) => {
                // Changes between a snapshot being served and the stream
                // opening are never pushed.
                if self.connected_once {
                    info!("push channel reconnected, resyncing");
                } else {
                    self.connected_once = true;
                    info!("push channel connected, resyncing");
                }
                self.roles
                    .iter()
                    .map(|&role| {
                        let seq = self.reconciler.begin_resync(role);
                        (role, SnapshotKind::Resync { seq })
                    })
                    .collect()
            }
            EngineMessage::Channel(ChannelEvent::Disconnected) => {
                warn!("push channel disconnected");
                Vec::new()
            }
            EngineMessage::Channel(ChannelEvent::Roster(event)) => {
                if self.roles.contains(&event.role()) {
                    self.reconciler.apply(event);
                } else {
                    debug!(role = %event.role(), "ignoring event for untracked role");
                }
                Vec::new()
            }
        }
    }

    /// Launch the initial snapshots and the push channel, then apply
    /// messages until `shutdown` flips. Returns the final roster.
    pub async fn run<S: SnapshotSource>(
        mut self,
        source: S,
        channel: PushChannel,
        mut shutdown: watch::Receiver<bool>,
    ) -> RosterStore<P> {
        let loader = SnapshotLoader::new(source, self.tx.clone());
        for &role in &self.roles {
            loader.launch(role, SnapshotKind::Initial);
        }
        let channel_task = tokio::spawn(channel.run(self.tx.clone(), shutdown.clone()));
        info!(roles = ?self.roles, "roster engine started");

        while !*shutdown.borrow() {
            tokio::select! {
                msg = self.rx.recv() => {
                    let Some(msg) = msg else { break };
                    for (role, kind) in self.step(msg) {
                        loader.launch(role, kind);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        channel_task.abort();
        info!("roster engine stopped");
        self.reconciler.into_store()
    }
}
