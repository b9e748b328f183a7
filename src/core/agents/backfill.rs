// src/core/agents/backfill.rs

use crate::core::scheduler::{CycleBudget, SchedulerDriver};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Drives one scheduler cycle per tick (§4.4, §5). Named "backfill" after
/// the periodic agent list in §2.7; the actual backfill-vs-strict-priority
/// choice lives in the selector's attempt sequence, not here.
pub struct BackfillAgent {
    driver: Arc<SchedulerDriver>,
    budget: CycleBudget,
}

impl BackfillAgent {
    pub fn new(driver: Arc<SchedulerDriver>, budget: CycleBudget) -> Self {
        Self { driver, budget }
    }

    pub async fn run(self, interval: std::time::Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = crate::core::clock::now_unix();
                    match self.driver.run_cycle(now, self.budget).await {
                        Ok(started) if started > 0 => info!(started, "backfill cycle started jobs"),
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "backfill cycle failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("backfill agent shutting down");
                    return;
                }
            }
        }
    }
}
