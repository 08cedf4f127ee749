//! Error types for roster state.

use thiserror::Error;

/// Result type alias for roster state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised while interpreting roster values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown role: {0}")]
    UnknownRole(String),
}
