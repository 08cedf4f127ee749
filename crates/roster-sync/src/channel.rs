//! Push channel — reconnecting SSE subscription to the hub's event feed.
//!
//! The channel owns the transport concerns the engine ignores:
//! connecting, decoding frames, and reconnecting with exponential
//! backoff. It reports `Connected` each time a stream opens; the engine
//! decides what a reconnection means.

use std::time::Duration;

use bytes::Bytes;
use http::Method;
use http::header::ACCEPT;
use http_body_util::BodyExt;
use roster_state::RosterEvent;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client;
use crate::engine::EngineMessage;
use crate::error::{SyncError, SyncResult};
use crate::sse::SseDecoder;

/// Route of the hub's roster event stream.
pub const EVENTS_PATH: &str = "/api/v1/events";

/// Lifecycle and payload events produced by the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A stream opened. The engine resyncs every tracked role on it.
    Connected,
    /// An open stream ended.
    Disconnected,
    Roster(RosterEvent),
}

/// Reconnection settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff between reconnection attempts.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay before the next attempt; doubles up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

enum StreamEnd {
    /// Hub closed the stream; reconnect.
    Closed,
    /// Shutdown requested or the engine is gone.
    Stopped,
}

/// SSE client feeding the engine queue.
pub struct PushChannel {
    authority: String,
    config: ChannelConfig,
}

impl PushChannel {
    /// `authority` is the hub's `host:port`.
    pub fn new(authority: impl Into<String>, config: ChannelConfig) -> Self {
        Self {
            authority: authority.into(),
            config,
        }
    }

    /// Subscribe until shutdown, reconnecting whenever the stream ends.
    pub async fn run(self, tx: mpsc::Sender<EngineMessage>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);

        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.stream_once(&tx, &mut shutdown, &mut backoff).await {
                Ok(StreamEnd::Stopped) => return,
                Ok(StreamEnd::Closed) => {
                    info!(hub = %self.authority, "push channel closed by hub");
                }
                Err(e) => {
                    warn!(hub = %self.authority, error = %e, "push channel failed");
                }
            }

            let delay = backoff.next_delay();
            debug!(?delay, "reconnecting push channel");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn stream_once(
        &self,
        tx: &mpsc::Sender<EngineMessage>,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Backoff,
    ) -> SyncResult<StreamEnd> {
        let resp = client::request(
            &self.authority,
            Method::GET,
            EVENTS_PATH,
            &[(ACCEPT, "text/event-stream".to_string())],
            Bytes::new(),
        )
        .await?;
        let mut body = client::ensure_success(EVENTS_PATH, resp)?.into_body();

        if !forward(tx, ChannelEvent::Connected).await {
            return Ok(StreamEnd::Stopped);
        }
        backoff.reset();

        let mut decoder = SseDecoder::new();
        let end = loop {
            let frame = tokio::select! {
                frame = body.frame() => frame,
                _ = shutdown.changed() => break Ok(StreamEnd::Stopped),
            };
            let chunk = match frame {
                None => break Ok(StreamEnd::Closed),
                Some(Err(e)) => break Err(SyncError::Body(e.to_string())),
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => data,
                    Err(_) => continue,
                },
            };

            let mut engine_gone = false;
            for sse in decoder.push(&chunk) {
                match serde_json::from_str::<RosterEvent>(&sse.data) {
                    Ok(event) => {
                        if !forward(tx, ChannelEvent::Roster(event)).await {
                            engine_gone = true;
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(event = ?sse.event, error = %e, "skipping malformed push frame");
                    }
                }
            }
            if engine_gone {
                break Ok(StreamEnd::Stopped);
            }
        };

        if !matches!(end, Ok(StreamEnd::Stopped)) && !forward(tx, ChannelEvent::Disconnected).await {
            return Ok(StreamEnd::Stopped);
        }
        end
    }
}

/// Send to the engine; false once the engine has stopped.
async fn forward(tx: &mpsc::Sender<EngineMessage>, event: ChannelEvent) -> bool {
    tx.send(EngineMessage::Channel(event)).await.is_ok()
}
