use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use random_average::config::Config;
use random_average::{server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration & logging ──────────────────────────────
    let config = Config::from_env().context("invalid configuration")?;
    config.logging.init();

    info!(
        upstream = %config.upstream_url,
        mode = ?config.mode,
        transport = ?config.transport,
        "starting random-average"
    );

    // ── 2. Build shared state (starts the poll loop if enabled) ─
    let state = Arc::new(AppState::from_config(&config).context("building upstream client")?);

    // ── 3. Build Axum router ────────────────────────────────────
    let app = server::create_router(Arc::clone(&state));

    // ── 4. Bind & serve ─────────────────────────────────────────
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    // ── 5. Stop background work ─────────────────────────────────
    state.service.shutdown().await;
    info!("shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
