// src/core/rpc/dispatcher.rs

//! RPC dispatch (§9, §5 "Cancellation and timeouts"): every handler accepts
//! a deadline and returns TIMEOUT without side effects if it has already
//! passed before the handler does anything that mutates state.

use super::client::{ClientRequest, CompleteJob, KillJob, SubmitBatchJob, UpdateNode, UpdatePartition};
use crate::core::accounting::AccountingStore;
use crate::core::errors::ClusterError;
use crate::core::model::step::StepId;
use crate::core::model::{Job, JobState, Node, Partition};
use crate::core::state::ControllerState;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Deadline(pub Instant);

impl Deadline {
    pub fn from_now(timeout: std::time::Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

#[derive(Debug, Clone)]
pub enum ClientResponse {
    JobSubmitted { job_id: u64 },
    Ack,
    Jobs(Vec<Job>),
    Nodes(Vec<Node>),
    Partitions(Vec<Partition>),
    Error(ClusterError),
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: ClientRequest, deadline: Deadline) -> ClientResponse;
}

/// In-process dispatcher used by embedded tests and by the server's own RPC
/// listener once wired to a transport.
pub struct ControllerHandle {
    state: Arc<ControllerState>,
    accounting: Arc<dyn AccountingStore>,
    cluster_name: String,
}

impl ControllerHandle {
    pub fn new(state: Arc<ControllerState>, accounting: Arc<dyn AccountingStore>, cluster_name: String) -> Self {
        Self { state, accounting, cluster_name }
    }

    async fn submit(&self, req: SubmitBatchJob, now: i64) -> ClientResponse {
        match self
            .state
            .create_job(req.partition, req.account, req.uid, req.gid, req.request, now)
            .await
        {
            Ok(job_id) => {
                crate::core::metrics::JOBS_SUBMITTED.inc();
                ClientResponse::JobSubmitted { job_id }
            }
            Err(e) => ClientResponse::Error(e),
        }
    }

    async fn kill(&self, req: KillJob, now: i64) -> ClientResponse {
        let mut jobs = self.state.jobs.write().await;
        let Some(job) = jobs.get_mut(req.job_id) else {
            return ClientResponse::Error(ClusterError::NotFound(format!("job {} not found", req.job_id)));
        };
        // Cancel is idempotent: a terminal job is a no-op success (§5).
        if job.state.is_terminal() {
            return ClientResponse::Ack;
        }
        job.state = JobState::Cancelled;
        job.end_time = Some(now);
        job.requid = Some(req.requesting_uid);
        let had_allocation = job.allocation.is_some();
        drop(jobs);
        if had_allocation {
            if let Err(e) = self.state.release_job_allocation(req.job_id).await {
                return ClientResponse::Error(e);
            }
            if let Err(e) = self.accounting.add_job_end(&self.cluster_name, req.job_id, now).await {
                return ClientResponse::Error(e);
            }
        }
        ClientResponse::Ack
    }

    async fn complete(&self, req: CompleteJob, now: i64) -> ClientResponse {
        let mut jobs = self.state.jobs.write().await;
        let Some(job) = jobs.get_mut(req.job_id) else {
            return ClientResponse::Error(ClusterError::NotFound(format!("job {} not found", req.job_id)));
        };
        job.exit_code = Some(req.rc);
        job.state = if req.rc == 0 { JobState::Completing } else { JobState::Failed };
        drop(jobs);
        if let Err(e) = self.accounting.add_step_complete(&self.cluster_name, req.job_id, StepId::Batch, now, req.rc).await {
            return ClientResponse::Error(e);
        }
        if let Err(e) = self.accounting.add_job_end(&self.cluster_name, req.job_id, now).await {
            return ClientResponse::Error(e);
        }
        ClientResponse::Ack
    }

    async fn load_jobs(&self, since_time: i64) -> ClientResponse {
        let jobs = self.state.jobs.read().await;
        ClientResponse::Jobs(jobs.jobs.values().filter(|j| j.submit_time >= since_time).cloned().collect())
    }

    async fn load_nodes(&self) -> ClientResponse {
        ClientResponse::Nodes(self.state.list_nodes().await)
    }

    async fn load_partitions(&self) -> ClientResponse {
        let partitions = self.state.partitions.read().await;
        ClientResponse::Partitions(partitions.values().cloned().collect())
    }

    async fn update_node(&self, req: UpdateNode, now: i64) -> ClientResponse {
        match self
            .state
            .mark_node_state(&req.name_expression, req.new_state, req.set_flags, req.clear_flags, now)
            .await
        {
            Ok(()) => ClientResponse::Ack,
            Err(e) => ClientResponse::Error(e),
        }
    }

    async fn update_partition(&self, req: UpdatePartition) -> ClientResponse {
        let mut partitions = self.state.partitions.write().await;
        let Some(p) = partitions.get_mut(&req.name) else {
            return ClientResponse::Error(ClusterError::NotFound(format!("partition \"{}\" not found", req.name)));
        };
        if let Some(state) = req.new_state {
            p.state = state;
        }
        if let Some(priority) = req.priority {
            p.priority = priority;
        }
        ClientResponse::Ack
    }
}

#[async_trait]
impl Dispatcher for ControllerHandle {
    async fn dispatch(&self, request: ClientRequest, deadline: Deadline) -> ClientResponse {
        if deadline.expired() {
            return ClientResponse::Error(ClusterError::Timeout("deadline exceeded before dispatch".to_string()));
        }

        let now = crate::core::clock::now_unix();
        match request {
            ClientRequest::SubmitBatchJob(req) => self.submit(req, now).await,
            ClientRequest::AllocateResources(req) => {
                self.submit(SubmitBatchJob { partition: req.partition, account: req.account, uid: req.uid, gid: req.gid, request: req.request }, now)
                    .await
            }
            ClientRequest::KillJob(req) => self.kill(req, now).await,
            ClientRequest::CompleteJob(req) => self.complete(req, now).await,
            ClientRequest::LoadJobs(req) => self.load_jobs(req.since_time).await,
            ClientRequest::LoadNodes(_) => self.load_nodes().await,
            ClientRequest::LoadPartitions(_) => self.load_partitions().await,
            ClientRequest::UpdateNode(req) => self.update_node(req, now).await,
            ClientRequest::UpdatePartition(req) => self.update_partition(req).await,
            ClientRequest::Reconfigure => ClientResponse::Ack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::job::MemoryScope;
    use crate::core::model::{JobRequest, TaskDistribution};

    fn req() -> JobRequest {
        JobRequest {
            min_nodes: 1,
            max_nodes: None,
            min_cpus: 1,
            cpus_per_task: 1,
            pn_min_memory_mb: 0,
            memory_scope: MemoryScope::PerNode,
            pn_min_cpus: 1,
            time_limit: std::time::Duration::from_secs(1),
            contiguous: false,
            features: None,
            gres: Vec::new(),
            nodelist: Vec::new(),
            excluded_nodelist: Vec::new(),
            required_nodelist: Vec::new(),
            ntasks_per_node: None,
            distribution: TaskDistribution::Block,
            shared: false,
        }
    }

    #[tokio::test]
    async fn submit_then_kill_is_idempotent() {
        let state = Arc::new(ControllerState::new());
        let handle = ControllerHandle::new(state, Arc::new(crate::core::accounting::InMemoryAccountingStore::new()), "test".to_string());
        let deadline = Deadline::from_now(std::time::Duration::from_secs(5));

        let resp = handle
            .dispatch(
                ClientRequest::SubmitBatchJob(SubmitBatchJob { partition: "batch".to_string(), account: "a".to_string(), uid: 1, gid: 1, request: req() }),
                deadline,
            )
            .await;
        let job_id = match resp {
            ClientResponse::JobSubmitted { job_id } => job_id,
            other => panic!("unexpected {other:?}"),
        };

        let resp = handle.dispatch(ClientRequest::KillJob(KillJob { job_id, signal: 15, requesting_uid: 1 }), deadline).await;
        assert!(matches!(resp, ClientResponse::Ack));

        // Killing again is a no-op success.
        let resp = handle.dispatch(ClientRequest::KillJob(KillJob { job_id, signal: 15, requesting_uid: 1 }), deadline).await;
        assert!(matches!(resp, ClientResponse::Ack));
    }

    #[tokio::test]
    async fn expired_deadline_short_circuits() {
        let state = Arc::new(ControllerState::new());
        let handle = ControllerHandle::new(state, Arc::new(crate::core::accounting::InMemoryAccountingStore::new()), "test".to_string());
        let deadline = Deadline(Instant::now() - std::time::Duration::from_secs(1));
        let resp = handle.dispatch(ClientRequest::LoadNodes(super::super::client::LoadNodes { since_time: 0 }), deadline).await;
        assert!(matches!(resp, ClientResponse::Error(ClusterError::Timeout(_))));
    }
}
