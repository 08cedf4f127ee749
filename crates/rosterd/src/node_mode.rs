//! Node mode — registers with the hub and stays a member until ctrl-c.

use roster_sync::{AgentConfig, NodeAgent};
use tokio::sync::watch;
use tracing::info;

/// Run the node agent.
pub async fn run_node(config: AgentConfig) -> anyhow::Result<()> {
    info!(hub = %config.hub, role = %config.role, hostname = %config.hostname, "rosterd starting in node mode");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        crate::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut agent = NodeAgent::new(config);
    let received = agent
        .run(
            |command| println!("command #{}: {}", command.seq, command.name),
            shutdown_rx,
        )
        .await?;

    info!(received, "node agent stopped");
    Ok(())
}
