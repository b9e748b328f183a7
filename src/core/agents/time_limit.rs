// src/core/agents/time_limit.rs

use crate::core::model::JobState;
use crate::core::state::ControllerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Time-limit enforcement (§4.4): every running job whose
/// `start_time + time_limit <= now` is signaled and transitioned to TIMEOUT.
/// The grace window between SIGTERM and SIGKILL is the node agent's
/// responsibility; this agent only owns the state transition and triggers
/// the termination RPC dispatch through `on_timeout`.
pub struct TimeLimitAgent<F> {
    state: Arc<ControllerState>,
    on_timeout: F,
}

impl<F> TimeLimitAgent<F>
where
    F: Fn(u64) + Send + Sync + 'static,
{
    pub fn new(state: Arc<ControllerState>, on_timeout: F) -> Self {
        Self { state, on_timeout }
    }

    pub async fn sweep_once(&self, now: i64) -> usize {
        let mut jobs = self.state.jobs.write().await;
        let mut expired = Vec::new();
        for job in jobs.jobs.values_mut() {
            if job.state != JobState::Running {
                continue;
            }
            let Some(start) = job.start_time else { continue };
            if start + job.request.time_limit.as_secs() as i64 <= now {
                job.state = JobState::Timeout;
                job.end_time = Some(now);
                expired.push(job.job_id);
            }
        }
        drop(jobs);

        for job_id in &expired {
            warn!(job_id, "job exceeded its time limit");
            (self.on_timeout)(*job_id);
            if let Err(e) = self.state.release_job_allocation(*job_id).await {
                warn!(error = %e, "failed to release allocation for timed-out job");
            }
        }
        expired.len()
    }

    pub async fn run(self, interval: std::time::Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = crate::core::clock::now_unix();
                    let n = self.sweep_once(now).await;
                    if n > 0 {
                        info!(count = n, "time_limit agent terminated jobs");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("time_limit agent shutting down");
                    return;
                }
            }
        }
    }
}
