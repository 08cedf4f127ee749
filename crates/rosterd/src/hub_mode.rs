//! Hub mode — serves the roster API, event streams, and roster page.

use std::net::SocketAddr;
use std::sync::Arc;

use roster_hub::Membership;
use tokio::sync::watch;
use tracing::info;

use crate::config::HubSection;

/// Run the hub until ctrl-c.
pub async fn run_hub(config: HubSection) -> anyhow::Result<()> {
    info!("rosterd starting in hub mode");

    let membership = Arc::new(Membership::new(config.settings()));
    info!(
        ttl_secs = config.registration_ttl_secs,
        event_buffer = config.event_buffer,
        "membership registry initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────

    let reaper_handle = tokio::spawn(roster_hub::run_reaper(
        membership.clone(),
        config.reap_interval(),
        shutdown_rx,
    ));

    // ── API server ─────────────────────────────────────────────

    let router = roster_hub::build_router(membership.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "hub server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Open SSE streams end once the registry is closed.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        crate::shutdown_signal().await;
        membership.close();
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    let _ = reaper_handle.await;

    info!("hub stopped");
    Ok(())
}
