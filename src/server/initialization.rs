// src/server/initialization.rs

//! Handles the complete controller initialization process: state setup,
//! selector/priority wiring, and persisted-state restore.

use super::context::{build_selector, ControllerContext};
use crate::config::Config;
use crate::core::accounting::InMemoryAccountingStore;
use crate::core::persistence;
use crate::core::rpc::ControllerHandle;
use crate::core::scheduler::{DefaultPriority, SchedulerDriver};
use crate::core::state::ControllerState;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

/// Initializes all controller components before the background agents run.
pub async fn setup(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ControllerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = Arc::new(ControllerState::new());

    tokio::fs::create_dir_all(&config.state_save_location).await.map_err(|e| {
        anyhow::anyhow!("failed to create state_save_location '{}': {}", config.state_save_location, e)
    })?;

    match persistence::restore(&state, &config.state_save_location).await {
        Ok(()) => info!("restored controller state from {}", config.state_save_location),
        Err(e) => warn!(error = %e, "no usable prior state found, starting with an empty state"),
    }

    let accounting_store: Arc<dyn crate::core::accounting::AccountingStore> = Arc::new(InMemoryAccountingStore::new());

    let selector = build_selector(&config);
    let driver = Arc::new(SchedulerDriver::new(
        state.clone(),
        selector,
        Arc::new(DefaultPriority::default()),
        accounting_store.clone(),
        config.cluster_name.clone(),
    ));
    let handle = Arc::new(ControllerHandle::new(state.clone(), accounting_store.clone(), config.cluster_name.clone()));

    Ok(ControllerContext {
        config,
        state,
        accounting_store,
        handle,
        driver,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        log_reload_handle,
    })
}

fn log_startup_info(config: &Config) {
    info!(
        cluster_name = %config.cluster_name,
        slurmctld_port = config.slurmctld_port,
        select_type = %config.select_type,
        preempt_mode = %config.preempt_mode,
        "controller starting up"
    );
}
