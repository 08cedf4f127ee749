//! REST and SSE handlers.

use std::convert::Infallible;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use futures_util::{Stream, StreamExt};
use roster_state::{Command, NodeId, Role, RosterEvent, Snapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::HubState;
use crate::error::HubError;
use crate::membership::Lease;

pub const DEFAULT_COMMAND: &str = "ping";

// ── Roster ──────────────────────────────────────────────────────

/// GET /api/v1/roster/{role}
pub async fn roster_snapshot(
    State(state): State<HubState>,
    Path(role): Path<String>,
) -> Result<Json<Snapshot>, HubError> {
    let role: Role = role.parse()?;
    Ok(Json(state.membership.snapshot(role)))
}

/// GET /api/v1/roster/{role}/count
pub async fn roster_count(
    State(state): State<HubState>,
    Path(role): Path<String>,
) -> Result<String, HubError> {
    let role: Role = role.parse()?;
    Ok(state.membership.count(role).to_string())
}

// ── Registration ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub client_id: NodeId,
}

/// POST /api/v1/register
///
/// Any `Authorization` header is accepted; the token is not checked.
pub async fn register(
    State(state): State<HubState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !headers.contains_key(AUTHORIZATION) {
        return (StatusCode::UNAUTHORIZED, "Not authorized").into_response();
    }
    let req: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let client_id = state.membership.register(req.role, &req.hostname);
    Json(RegisterResponse { client_id }).into_response()
}

// ── Listen ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListenParams {
    pub id: Option<String>,
    pub role: Option<Role>,
}

/// GET /api/v1/listen?id=..&role=..
///
/// The node is a member while this stream is open.
pub async fn listen(State(state): State<HubState>, Query(params): Query<ListenParams>) -> Response {
    let Some(id) = params.id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "No id in request").into_response();
    };
    let lease = match state.membership.connect(&NodeId::from(id), params.role) {
        Ok(lease) => lease,
        Err(e) => {
            debug!(error = %e, "listen rejected");
            return e.into_response();
        }
    };

    let commands = state.membership.subscribe_commands();
    let stream = command_stream(commands, lease).take_until(state.membership.closed());
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.membership.settings().keep_alive))
        .into_response()
}

/// Commands for one node. Owns the lease, so the node leaves when the
/// client goes away and the stream is dropped.
fn command_stream(
    commands: broadcast::Receiver<Command>,
    lease: Lease,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((commands, lease), |(mut rx, lease)| async move {
        loop {
            match rx.recv().await {
                Ok(command) => match Event::default().event("command").json_data(&command) {
                    Ok(event) => return Some((Ok(event), (rx, lease))),
                    Err(e) => warn!(error = %e, "failed to encode command"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(id = %lease.node().id, skipped, "listener lagged, commands dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

// ── Events ──────────────────────────────────────────────────────

/// GET /api/v1/events
pub async fn events(State(state): State<HubState>) -> impl IntoResponse {
    let rx = state.membership.subscribe();
    debug!(subscribers = state.membership.event_subscribers(), "event subscriber attached");
    Sse::new(event_stream(rx).take_until(state.membership.closed()))
        .keep_alive(KeepAlive::new().interval(state.membership.settings().keep_alive))
}

/// Roster events for one subscriber. A lagged subscriber has missed
/// changes, so its stream ends; the client reconnects and resyncs.
fn event_stream(
    events: broadcast::Receiver<RosterEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(events, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(roster_event) => {
                    match Event::default().event(roster_event.name()).json_data(&roster_event) {
                        Ok(event) => return Some((Ok(event), rx)),
                        Err(e) => warn!(error = %e, "failed to encode roster event"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, closing stream");
                    return None;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

// ── Commands ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default = "default_command")]
    pub name: String,
}

impl Default for CommandRequest {
    fn default() -> Self {
        Self {
            name: default_command(),
        }
    }
}

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub seq: u64,
    pub delivered: usize,
}

/// POST /api/v1/send-command
///
/// The body is optional; an empty one sends the default command.
pub async fn send_command(State(state): State<HubState>, body: Bytes) -> Response {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CommandRequest::default()
    } else {
        match serde_json::from_slice::<CommandRequest>(&body) {
            Ok(req) => req,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };

    let (command, delivered) = state.membership.send_command(&req.name);
    Json(CommandResponse {
        seq: command.seq,
        delivered,
    })
    .into_response()
}
