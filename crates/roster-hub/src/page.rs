//! Server-rendered roster page.

use askama::Template;
use axum::extract::State;
use axum::response::Html;
use roster_state::{Node, Role};

use crate::HubState;

pub struct NodeRow {
    pub id: String,
    pub short_id: String,
    pub hostname: String,
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.to_string(),
            short_id: node.id.short().to_string(),
            hostname: node.hostname.clone(),
        }
    }
}

pub struct RoleTable {
    pub role: &'static str,
    pub heading: &'static str,
    pub rows: Vec<NodeRow>,
}

#[derive(Template)]
#[template(path = "roster.html")]
struct RosterTemplate {
    tables: Vec<RoleTable>,
}

fn heading(role: Role) -> &'static str {
    match role {
        Role::Worker => "Workers",
        Role::Server => "Servers",
    }
}

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(tmpl.render().unwrap_or_else(|e| {
        format!("<pre>Template error: {e}</pre>")
    }))
}

/// GET /
pub async fn roster_page(State(state): State<HubState>) -> Html<String> {
    let tables = Role::ALL
        .into_iter()
        .map(|role| RoleTable {
            role: role.plural(),
            heading: heading(role),
            rows: state.membership.nodes(role).iter().map(NodeRow::from).collect(),
        })
        .collect();
    render(RosterTemplate { tables })
}
