//! Snapshot loader — one-shot full-membership fetch per role.
//!
//! Fetches run as independent tasks and post their result to the
//! engine queue; they never touch the roster directly. A failed fetch
//! is reported once and not retried.

use std::future::Future;
use std::sync::Arc;

use roster_state::{Role, Snapshot};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client;
use crate::engine::EngineMessage;
use crate::error::SyncResult;

/// Which fetch produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// The single startup fetch for a role.
    Initial,
    /// A full resync issued when the push channel connects.
    Resync { seq: u64 },
}

/// Anything that can produce the full membership of a role.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self, role: Role) -> impl Future<Output = SyncResult<Snapshot>> + Send;
}

/// Route serving the snapshot of `role`.
pub fn snapshot_path(role: Role) -> String {
    format!("/api/v1/roster/{}", role.plural())
}

/// Fetches snapshots from the hub's REST API.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    authority: String,
}

impl HttpSnapshotSource {
    /// `authority` is the hub's `host:port`.
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }
}

impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, role: Role) -> SyncResult<Snapshot> {
        client::get_json(&self.authority, &snapshot_path(role)).await
    }
}

/// Launches snapshot fetches and forwards results to the engine.
pub struct SnapshotLoader<S> {
    source: Arc<S>,
    tx: mpsc::Sender<EngineMessage>,
}

impl<S: SnapshotSource> SnapshotLoader<S> {
    pub fn new(source: S, tx: mpsc::Sender<EngineMessage>) -> Self {
        Self {
            source: Arc::new(source),
            tx,
        }
    }

    /// Start a fetch for `role`. The result arrives as
    /// [`EngineMessage::Snapshot`].
    pub fn launch(&self, role: Role, kind: SnapshotKind) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        debug!(%role, ?kind, "snapshot fetch launched");

        tokio::spawn(async move {
            let result = source.fetch(role).await;
            if tx
                .send(EngineMessage::Snapshot { role, kind, result })
                .await
                .is_err()
            {
                debug!(%role, "engine stopped before snapshot arrived");
            }
        })
    }
}
