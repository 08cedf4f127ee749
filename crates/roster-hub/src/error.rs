use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use roster_state::{NodeId, Role, StateError};
use thiserror::Error;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("client not registered: {0}")]
    NotRegistered(NodeId),

    #[error("registration expired: {0}")]
    RegistrationExpired(NodeId),

    #[error("client registered as {registered}, not {requested}")]
    RoleMismatch { registered: Role, requested: Role },

    #[error(transparent)]
    State(#[from] StateError),
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            HubError::State(StateError::UnknownRole(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let body = match &self {
            HubError::NotRegistered(_) | HubError::RegistrationExpired(_) => {
                "Client not registered".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), body).into_response()
    }
}
