// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

mod context;
mod initialization;
mod metrics_server;
mod spawner;

pub use context::ControllerContext;

/// The main controller startup function, orchestrating all setup phases and
/// running until a shutdown signal arrives.
pub async fn run(config: Config, log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>) -> Result<()> {
    let mut ctx = initialization::setup(config, log_reload_handle).await?;

    spawner::spawn_all(&mut ctx).await?;

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping background agents");

    ctx.shutdown_tx.send(()).ok();

    while let Some(result) = ctx.background_tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "background agent exited with an error"),
            Err(e) => warn!(error = %e, "background agent task panicked"),
        }
    }

    if let Err(e) = crate::core::persistence::checkpoint(&ctx.state, &ctx.config.state_save_location).await {
        warn!(error = %e, "final checkpoint on shutdown failed");
    }

    info!("controller shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sig) = signal(SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
