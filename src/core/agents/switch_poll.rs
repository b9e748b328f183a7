// src/core/agents/switch_poll.rs

use crate::core::state::ControllerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Periodic switch/interconnect health poll. Vendor-specific table
/// programming is out of scope (§1); this agent only tracks whether nodes
/// with topology coordinates are consistently reachable, surfacing drift as
/// a warning for the topology selector to avoid.
pub struct SwitchPollAgent {
    state: Arc<ControllerState>,
}

impl SwitchPollAgent {
    pub fn new(state: Arc<ControllerState>) -> Self {
        Self { state }
    }

    pub async fn poll_once(&self) -> usize {
        let nodes = self.state.nodes.read().await;
        nodes
            .nodes
            .iter()
            .filter(|n| n.coords.is_some() && !n.is_up())
            .count()
    }

    pub async fn run(self, interval: std::time::Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let unreachable = self.poll_once().await;
                    if unreachable > 0 {
                        warn!(count = unreachable, "switch_poll found topology-coordinated nodes that are down");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("switch_poll agent shutting down");
                    return;
                }
            }
        }
    }
}
