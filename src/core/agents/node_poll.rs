// src/core/agents/node_poll.rs

use crate::core::accounting::AccountingStore;
use crate::core::model::{JobState, NodeFlags, NodeState};
use crate::core::node_machine::HeartbeatOutcome;
use crate::core::state::ControllerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Periodic pass over the node table applying the heartbeat timeout policy
/// (§4.3): flags NO_RESPOND, marks DOWN, and fails running jobs on nodes
/// that go DOWN.
pub struct NodePollAgent {
    state: Arc<ControllerState>,
    accounting: Arc<dyn AccountingStore>,
    cluster_name: String,
    t_nack_secs: i64,
    t_down_secs: i64,
}

impl NodePollAgent {
    pub fn new(
        state: Arc<ControllerState>,
        accounting: Arc<dyn AccountingStore>,
        cluster_name: String,
        t_nack_secs: i64,
        t_down_secs: i64,
    ) -> Self {
        Self { state, accounting, cluster_name, t_nack_secs, t_down_secs }
    }

    pub async fn poll_once(&self, now: i64) -> usize {
        let down_names: Vec<String> = {
            let nodes = self.state.nodes.read().await;
            nodes
                .nodes
                .iter()
                .filter_map(|n| {
                    match crate::core::node_machine::evaluate_heartbeat(now, n.last_response, self.t_nack_secs, self.t_down_secs) {
                        HeartbeatOutcome::Down if n.state != NodeState::Down => Some(n.name.clone()),
                        _ => None,
                    }
                })
                .collect()
        };

        let nack_names: Vec<String> = {
            let nodes = self.state.nodes.read().await;
            nodes
                .nodes
                .iter()
                .filter_map(|n| {
                    match crate::core::node_machine::evaluate_heartbeat(now, n.last_response, self.t_nack_secs, self.t_down_secs) {
                        HeartbeatOutcome::NoRespondSet if !n.flags.contains(NodeFlags::NO_RESPOND) => Some(n.name.clone()),
                        _ => None,
                    }
                })
                .collect()
        };

        for name in &nack_names {
            let _ = self
                .state
                .mark_node_state(name, None, NodeFlags::NO_RESPOND, NodeFlags::empty(), now)
                .await;
        }

        for name in &down_names {
            if let Err(e) = self.state.mark_node_state(name, Some(NodeState::Down), NodeFlags::empty(), NodeFlags::empty(), now).await {
                warn!(node = %name, error = %e, "failed to transition unresponsive node to DOWN");
                continue;
            }
            self.fail_jobs_on_node(name, now).await;
            warn!(node = %name, "node marked DOWN after heartbeat timeout");
        }

        down_names.len()
    }

    async fn fail_jobs_on_node(&self, node_name: &str, now: i64) {
        let node_index = {
            let nodes = self.state.nodes.read().await;
            match nodes.find_by_name(node_name) {
                Some(n) => n.index,
                None => return,
            }
        };

        let affected_jobs: Vec<u64> = {
            let nodes = self.state.nodes.read().await;
            nodes.get(node_index).map(|n| n.active_jobs.clone()).unwrap_or_default()
        };

        let mut failed_jobs = Vec::new();
        {
            let mut jobs = self.state.jobs.write().await;
            for job_id in affected_jobs {
                if let Some(job) = jobs.get_mut(job_id) {
                    if job.is_running_or_suspended() {
                        job.state = JobState::NodeFail;
                        job.end_time = Some(now);
                        job.clear_allocation();
                        failed_jobs.push(job_id);
                    }
                }
            }
        }
        for job_id in failed_jobs {
            if let Err(e) = self.accounting.add_job_end(&self.cluster_name, job_id, now).await {
                warn!(job_id, error = %e, "failed to record accounting end for node-failed job");
            }
        }
    }

    pub async fn run(self, interval: std::time::Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = crate::core::clock::now_unix();
                    let transitioned = self.poll_once(now).await;
                    if transitioned > 0 {
                        info!(count = transitioned, "node_poll transitioned nodes to DOWN");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("node_poll agent shutting down");
                    return;
                }
            }
        }
    }
}
