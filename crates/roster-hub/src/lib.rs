//! roster-hub — the membership hub nodes register with.
//!
//! Owns the true roster. Nodes register, then hold a listen stream open
//! for as long as they are members. Watchers read per-role snapshots and
//! follow the event stream.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/roster/{role}` | Snapshot of connected nodes |
//! | GET | `/api/v1/roster/{role}/count` | Connected node count |
//! | POST | `/api/v1/register` | Create a pending registration |
//! | GET | `/api/v1/listen` | Membership + command stream (SSE) |
//! | GET | `/api/v1/events` | Join/leave event stream (SSE) |
//! | POST | `/api/v1/send-command` | Broadcast a command |
//! | GET | `/` | Roster page |

pub mod error;
pub mod handlers;
pub mod membership;
pub mod page;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub use error::{HubError, HubResult};
pub use membership::{HubSettings, Lease, Membership, run_reaper};

/// Shared state for hub handlers.
#[derive(Clone)]
pub struct HubState {
    pub membership: Arc<Membership>,
}

/// Build the complete hub router (REST + SSE + page).
pub fn build_router(membership: Arc<Membership>) -> Router {
    let state = HubState { membership };

    let api_routes = Router::new()
        .route("/roster/{role}", get(handlers::roster_snapshot))
        .route("/roster/{role}/count", get(handlers::roster_count))
        .route("/register", post(handlers::register))
        .route("/listen", get(handlers::listen))
        .route("/events", get(handlers::events))
        .route("/send-command", post(handlers::send_command))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/", get(page::roster_page).with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use roster_state::Role;
    use tower::ServiceExt;

    fn hub() -> (Arc<Membership>, Router) {
        let membership = Arc::new(Membership::new(HubSettings::default()));
        (membership.clone(), build_router(membership))
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn page_lists_connected_nodes_by_role() {
        let (membership, app) = hub();
        let id = membership.register(Role::Server, "<db-1>");
        let _lease = membership.connect(&id, None).unwrap();

        let resp = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let html = body_text(resp).await;
        assert!(html.contains("Workers (0)"));
        assert!(html.contains("Servers (1)"));
        assert!(html.contains(&format!("id=\"{id}\"")));
        assert!(html.contains(&format!("<td>{}</td>", id.short())));
        assert!(html.contains("db-1"));
        assert!(!html.contains("<db-1>"));
    }

    #[tokio::test]
    async fn send_command_without_body_sends_ping() {
        let (membership, app) = hub();
        let mut rx = membership.subscribe_commands();

        let resp = app
            .oneshot(
                Request::post("/api/v1/send-command")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["delivered"], 1);
        assert_eq!(rx.try_recv().unwrap().name, "ping");
    }

    #[tokio::test]
    async fn unknown_role_is_not_found() {
        let (_, app) = hub();
        let resp = app
            .oneshot(
                Request::get("/api/v1/roster/clients")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
