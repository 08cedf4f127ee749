//! Node agent — client-side cluster participation.
//!
//! The agent registers with the hub, then holds the listen stream
//! open. The hub counts the node as a member for exactly as long as
//! that stream lives, and pushes broadcast commands down it.

use bytes::Bytes;
use http::Method;
use http::header::{ACCEPT, AUTHORIZATION};
use http_body_util::BodyExt;
use roster_state::{Command, NodeId, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client;
use crate::error::{SyncError, SyncResult};
use crate::sse::SseDecoder;

pub const REGISTER_PATH: &str = "/api/v1/register";
pub const LISTEN_PATH: &str = "/api/v1/listen";

/// Configuration for the node agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hub `host:port`.
    pub hub: String,
    pub role: Role,
    pub hostname: String,
    /// Sent as a bearer token on registration.
    pub token: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    hostname: &'a str,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    client_id: NodeId,
}

/// Registers a node and keeps its membership alive.
pub struct NodeAgent {
    config: AgentConfig,
    /// Assigned node ID (set after register).
    node_id: Option<NodeId>,
}

impl NodeAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            node_id: None,
        }
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    /// Register with the hub and obtain a node id.
    pub async fn register(&mut self) -> SyncResult<NodeId> {
        let auth = format!("Bearer {}", self.config.token);
        let resp: RegisterResponse = client::post_json(
            &self.config.hub,
            REGISTER_PATH,
            &[(AUTHORIZATION, auth)],
            &RegisterRequest {
                hostname: &self.config.hostname,
                role: self.config.role,
            },
        )
        .await?;

        info!(
            node_id = %resp.client_id,
            role = %self.config.role,
            hostname = %self.config.hostname,
            "registered with hub"
        );
        self.node_id = Some(resp.client_id.clone());
        Ok(resp.client_id)
    }

    /// Hold the listen stream open until shutdown or until the hub
    /// closes it. Calls `on_command` for each broadcast command and
    /// returns how many were received.
    pub async fn listen(
        &self,
        mut on_command: impl FnMut(&Command),
        mut shutdown: watch::Receiver<bool>,
    ) -> SyncResult<u64> {
        let node_id = self.node_id.as_ref().ok_or(SyncError::NotRegistered)?;
        let path = format!("{LISTEN_PATH}?id={node_id}&role={}", self.config.role);

        let resp = client::request(
            &self.config.hub,
            Method::GET,
            &path,
            &[(ACCEPT, "text/event-stream".to_string())],
            Bytes::new(),
        )
        .await?;
        let mut body = client::ensure_success(&path, resp)?.into_body();
        info!(%node_id, "listening for commands");

        let mut decoder = SseDecoder::new();
        let mut received = 0u64;
        loop {
            let frame = tokio::select! {
                frame = body.frame() => frame,
                _ = shutdown.changed() => {
                    debug!(%node_id, "listen stopped by shutdown");
                    return Ok(received);
                }
            };
            let chunk = match frame {
                None => {
                    info!(%node_id, "hub closed listen stream");
                    return Ok(received);
                }
                Some(Err(e)) => return Err(SyncError::Body(e.to_string())),
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => data,
                    Err(_) => continue,
                },
            };

            for sse in decoder.push(&chunk) {
                match serde_json::from_str::<Command>(&sse.data) {
                    Ok(command) => {
                        received += 1;
                        info!(%node_id, seq = command.seq, name = %command.name, "command received");
                        on_command(&command);
                    }
                    Err(e) => warn!(error = %e, "skipping malformed command frame"),
                }
            }
        }
    }

    /// Register, then listen until shutdown.
    pub async fn run(
        &mut self,
        on_command: impl FnMut(&Command),
        shutdown: watch::Receiver<bool>,
    ) -> SyncResult<u64> {
        self.register().await?;
        self.listen(on_command, shutdown).await
    }
}
