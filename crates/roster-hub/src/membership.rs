//! Membership registry — the hub's authoritative roster.
//!
//! A node becomes a member in two steps. `register` hands out a fresh id
//! held as a pending registration; `connect` claims it and returns a
//! [`Lease`]. The node stays a member for as long as the lease lives,
//! which the listen handler ties to the lifetime of its SSE stream.
//!
//! Every membership change is broadcast as a [`RosterEvent`] while the
//! registry lock is held, so subscribers see changes in the same order
//! the snapshot endpoint would.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use roster_state::{Command, Node, NodeDetails, NodeId, Role, RosterEvent, Snapshot};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::error::{HubError, HubResult};

/// Tunables for the registry.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// How long a registration may wait for its listen stream.
    pub registration_ttl: Duration,
    /// Capacity of the event and command broadcast channels.
    pub event_buffer: usize,
    /// Interval between SSE keep-alive comments.
    pub keep_alive: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            registration_ttl: Duration::from_secs(30),
            event_buffer: 256,
            keep_alive: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct Pending {
    role: Role,
    hostname: String,
    registered_at: Instant,
}

#[derive(Debug, Default)]
struct Registry {
    pending: HashMap<NodeId, Pending>,
    connected: [IndexMap<NodeId, Node>; 2],
}

/// Shared membership state for all hub handlers.
pub struct Membership {
    registry: RwLock<Registry>,
    events: broadcast::Sender<RosterEvent>,
    commands: broadcast::Sender<Command>,
    command_seq: AtomicU64,
    closed: watch::Sender<bool>,
    settings: HubSettings,
}

impl Membership {
    pub fn new(settings: HubSettings) -> Self {
        let capacity = settings.event_buffer.max(1);
        let (events, _) = broadcast::channel(capacity);
        let (commands, _) = broadcast::channel(capacity);
        Self {
            registry: RwLock::new(Registry::default()),
            events,
            commands,
            command_seq: AtomicU64::new(0),
            closed: watch::Sender::new(false),
            settings,
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a pending registration and return its fresh id.
    pub fn register(&self, role: Role, hostname: &str) -> NodeId {
        let id = NodeId::new(uuid::Uuid::new_v4().to_string());
        self.write().pending.insert(
            id.clone(),
            Pending {
                role,
                hostname: hostname.to_string(),
                registered_at: Instant::now(),
            },
        );
        info!(%id, %role, hostname, "node registered");
        id
    }

    /// Claim a pending registration and make the node a member.
    ///
    /// `role`, when given, must match the registered role. The returned
    /// lease disconnects the node when dropped.
    pub fn connect(self: &Arc<Self>, id: &NodeId, role: Option<Role>) -> HubResult<Lease> {
        let mut registry = self.write();
        let Some(pending) = registry.pending.remove(id) else {
            return Err(HubError::NotRegistered(id.clone()));
        };
        if pending.registered_at.elapsed() > self.settings.registration_ttl {
            debug!(%id, "registration expired before connect");
            return Err(HubError::RegistrationExpired(id.clone()));
        }
        if let Some(requested) = role.filter(|r| *r != pending.role) {
            // Put it back; the node may retry with the right role.
            let registered = pending.role;
            registry.pending.insert(id.clone(), pending);
            return Err(HubError::RoleMismatch {
                registered,
                requested,
            });
        }

        let node = Node::new(id.clone(), pending.hostname, pending.role);
        registry.connected[node.role.index()].insert(id.clone(), node.clone());
        let _ = self.events.send(RosterEvent::Joined {
            role: node.role,
            id: id.clone(),
            hostname: node.hostname.clone(),
        });
        drop(registry);

        info!(%id, role = %node.role, hostname = %node.hostname, "node connected");
        Ok(Lease {
            membership: Arc::clone(self),
            node,
        })
    }

    /// Remove a member. Returns whether it was connected.
    pub fn disconnect(&self, role: Role, id: &NodeId) -> bool {
        let mut registry = self.write();
        if registry.connected[role.index()].shift_remove(id).is_none() {
            return false;
        }
        let _ = self.events.send(RosterEvent::Left {
            role,
            id: id.clone(),
        });
        drop(registry);

        info!(%id, %role, "node disconnected");
        true
    }

    /// Connected nodes of `role`, in connection order.
    pub fn snapshot(&self, role: Role) -> Snapshot {
        self.read().connected[role.index()]
            .values()
            .map(|node| {
                (
                    node.id.clone(),
                    NodeDetails {
                        hostname: node.hostname.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn nodes(&self, role: Role) -> Vec<Node> {
        self.read().connected[role.index()].values().cloned().collect()
    }

    pub fn count(&self, role: Role) -> usize {
        self.read().connected[role.index()].len()
    }

    pub fn pending_count(&self) -> usize {
        self.read().pending.len()
    }

    /// Subscribe to membership changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.events.subscribe()
    }

    /// Number of open event subscriptions.
    pub fn event_subscribers(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<Command> {
        self.commands.subscribe()
    }

    /// Broadcast a command to every listening node. Returns the command
    /// and how many listeners it reached.
    pub fn send_command(&self, name: &str) -> (Command, usize) {
        let command = Command {
            seq: self.command_seq.fetch_add(1, Ordering::Relaxed) + 1,
            name: name.to_string(),
        };
        let delivered = self.commands.send(command.clone()).unwrap_or(0);
        info!(seq = command.seq, name, delivered, "command sent");
        (command, delivered)
    }

    /// Signal every open stream to finish. Used on shutdown.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Resolves once [`Membership::close`] has been called.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut rx = self.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    /// Drop pending registrations older than the TTL.
    pub fn reap_expired(&self) -> Vec<NodeId> {
        let ttl = self.settings.registration_ttl;
        let mut registry = self.write();
        let expired: Vec<NodeId> = registry
            .pending
            .iter()
            .filter(|(_, p)| p.registered_at.elapsed() > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            registry.pending.remove(id);
        }
        expired
    }
}

/// Membership held by an open listen stream.
pub struct Lease {
    membership: Arc<Membership>,
    node: Node,
}

impl Lease {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.membership.disconnect(self.node.role, &self.node.id);
    }
}

/// Periodically reap expired registrations until shutdown.
pub async fn run_reaper(
    membership: Arc<Membership>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let expired = membership.reap_expired();
                if !expired.is_empty() {
                    info!(count = expired.len(), "reaped expired registrations");
                }
            }
            _ = shutdown.changed() => {
                debug!("registration reaper stopped");
                return;
            }
        }
    }
}
