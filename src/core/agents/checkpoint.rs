// src/core/agents/checkpoint.rs

use crate::core::persistence;
use crate::core::state::ControllerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

pub struct CheckpointAgent {
    state: Arc<ControllerState>,
    state_dir: String,
}

impl CheckpointAgent {
    pub fn new(state: Arc<ControllerState>, state_dir: String) -> Self {
        Self { state, state_dir }
    }

    pub async fn run(self, interval: std::time::Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match persistence::checkpoint(&self.state, &self.state_dir).await {
                        Ok(()) => info!("periodic checkpoint completed"),
                        Err(e) => error!(error = %e, "periodic checkpoint failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("checkpoint agent shutting down, writing final snapshot");
                    let _ = persistence::checkpoint(&self.state, &self.state_dir).await;
                    return;
                }
            }
        }
    }
}
