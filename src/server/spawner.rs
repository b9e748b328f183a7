// src/server/spawner.rs

//! Spawns all of the controller's periodic background agents.

use super::context::ControllerContext;
use super::metrics_server;
use crate::core::agents::{BackfillAgent, CheckpointAgent, NodePollAgent, RollupAgent, SwitchPollAgent, TimeLimitAgent};
use crate::core::scheduler::CycleBudget;
use anyhow::Result;
use tracing::{info, warn};

/// Spawns all background agents into the context's `JoinSet`.
pub async fn spawn_all(ctx: &mut ControllerContext) -> Result<()> {
    let state = ctx.state.clone();
    let accounting_store = ctx.accounting_store.clone();
    let cluster_name = ctx.config.cluster_name.clone();
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;
    let intervals = ctx.config.agents.clone();

    if !ctx.config.metrics_bind.is_empty() {
        let addr = ctx.config.metrics_bind.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(addr, shutdown_rx).await;
            Ok(())
        });
    } else {
        info!("metrics endpoint disabled (empty metrics_bind)");
    }

    let node_poll = NodePollAgent::new(
        state.clone(),
        accounting_store.clone(),
        cluster_name.clone(),
        intervals.node_response_timeout.as_secs() as i64 / 2,
        intervals.node_response_timeout.as_secs() as i64,
    );
    let node_poll_interval = intervals.node_poll;
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        node_poll.run(node_poll_interval, shutdown_rx).await;
        Ok(())
    });

    let switch_poll = SwitchPollAgent::new(state.clone());
    let switch_poll_interval = intervals.switch_poll;
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        switch_poll.run(switch_poll_interval, shutdown_rx).await;
        Ok(())
    });

    let time_limit = TimeLimitAgent::new(state.clone(), |job_id| {
        warn!(job_id, "time limit agent requesting job termination from node agents");
    });
    let time_limit_interval = intervals.time_limit;
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        time_limit.run(time_limit_interval, shutdown_rx).await;
        Ok(())
    });

    let backfill = BackfillAgent::new(ctx.driver.clone(), CycleBudget::default());
    let backfill_interval = intervals.backfill;
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        backfill.run(backfill_interval, shutdown_rx).await;
        Ok(())
    });

    let checkpoint = CheckpointAgent::new(state.clone(), ctx.config.state_save_location.clone());
    let checkpoint_interval = intervals.checkpoint;
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        checkpoint.run(checkpoint_interval, shutdown_rx).await;
        Ok(())
    });

    let rollup = RollupAgent::new(state.clone(), accounting_store.clone(), cluster_name.clone());
    let rollup_interval = intervals.rollup;
    let shutdown_rx = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        rollup.run(rollup_interval, shutdown_rx).await;
        Ok(())
    });

    info!("all background agents spawned");
    Ok(())
}
