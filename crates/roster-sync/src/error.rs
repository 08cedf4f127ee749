//! Error types for the sync engine and its HTTP clients.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised while talking to the hub.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("request {path} failed: {reason}")]
    Request { path: String, reason: String },

    #[error("{path} returned HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("reading response body failed: {0}")]
    Body(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("node is not registered")]
    NotRegistered,
}
