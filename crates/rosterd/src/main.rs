//! rosterd — the roster daemon.
//!
//! One binary, three roles:
//! - `serve`: the hub (membership registry, REST + SSE API, roster page)
//! - `watch`: the sync engine following a hub, printing a roster table
//! - `node`: a member that registers and holds its listen stream open
//!
//! # Usage
//!
//! ```text
//! rosterd serve --port 8080
//! rosterd watch --hub 127.0.0.1:8080 --role worker
//! rosterd node --hub 127.0.0.1:8080 --role server --hostname db-1
//! ```

mod config;
mod hub_mode;
mod node_mode;
mod watch_mode;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use roster_state::Role;
use roster_sync::AgentConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::RosterdConfig;

const DEFAULT_FILTER: &str = "info,rosterd=debug,roster=debug";

#[derive(Parser)]
#[command(name = "rosterd", about = "Cluster roster daemon")]
struct Cli {
    /// Path to rosterd.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the hub.
    Serve {
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Follow a hub's roster.
    Watch {
        /// Hub address (host:port).
        #[arg(long)]
        hub: Option<String>,

        /// Role to watch; repeat for several. Defaults to all.
        #[arg(long = "role")]
        roles: Vec<Role>,
    },

    /// Join a hub as a node.
    Node {
        /// Hub address (host:port).
        #[arg(long)]
        hub: Option<String>,

        #[arg(long, default_value = "worker")]
        role: Role,

        /// Defaults to $HOSTNAME.
        #[arg(long)]
        hostname: Option<String>,

        /// Bearer token sent on registration.
        #[arg(long, default_value = "rosterd")]
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = RosterdConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.hub.port = port;
            }
            hub_mode::run_hub(config.hub).await
        }
        Command::Watch { hub, roles } => {
            if let Some(hub) = hub {
                config.watch.hub = hub;
            }
            if !roles.is_empty() {
                config.watch.roles = roles;
            }
            watch_mode::run_watch(config.watch).await
        }
        Command::Node {
            hub,
            role,
            hostname,
            token,
        } => {
            let hostname = hostname
                .or_else(|| std::env::var("HOSTNAME").ok())
                .unwrap_or_else(|| "unknown".to_string());
            node_mode::run_node(AgentConfig {
                hub: hub.unwrap_or(config.watch.hub),
                role,
                hostname,
                token,
            })
            .await
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolves on ctrl-c.
pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
