//! Watch mode — follows the hub's roster and prints it as a table.

use roster_state::TableProjector;
use roster_sync::{HttpSnapshotSource, PushChannel, RosterEngine};
use tokio::sync::watch;
use tracing::info;

use crate::config::WatchSection;

/// Run the sync engine against `config.hub` until ctrl-c, then print
/// the final roster.
pub async fn run_watch(config: WatchSection) -> anyhow::Result<()> {
    if config.roles.is_empty() {
        anyhow::bail!("no roles to watch");
    }
    info!(hub = %config.hub, roles = ?config.roles, "rosterd starting in watch mode");

    let engine = RosterEngine::new(TableProjector::new(), &config.engine_config());
    let source = HttpSnapshotSource::new(config.hub.clone());
    let channel = PushChannel::new(config.hub.clone(), config.channel_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        crate::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let store = engine.run(source, channel, shutdown_rx).await;
    println!("{}", store.render());
    Ok(())
}
