// src/core/model/job.rs

use super::job_resources::JobResources;
use super::step::{Step, StepId, TaskDistribution};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Running,
    Suspended,
    Completing,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
    Preempted,
    BootFail,
    Deadline,
    OutOfMemory,
    Resizing,
}

impl JobState {
    /// Terminal states are all except PENDING/RUNNING/SUSPENDED/COMPLETING/RESIZING (§3.3).
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobState::Pending
                | JobState::Running
                | JobState::Suspended
                | JobState::Completing
                | JobState::Resizing
        )
    }
}

/// Whether `pn_min_memory` is interpreted per-CPU or per-node (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryScope {
    PerCpu,
    PerNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GresRequest {
    pub name: String,
    pub count: u32,
}

/// The user-submitted request portion of a job (§3.3), immutable once the
/// job is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub min_nodes: u32,
    pub max_nodes: Option<u32>,
    pub min_cpus: u32,
    pub cpus_per_task: u32,
    pub pn_min_memory_mb: u64,
    pub memory_scope: MemoryScope,
    pub pn_min_cpus: u32,
    pub time_limit: std::time::Duration,
    pub contiguous: bool,
    pub features: Option<String>,
    pub gres: Vec<GresRequest>,
    pub nodelist: Vec<String>,
    pub excluded_nodelist: Vec<String>,
    pub required_nodelist: Vec<String>,
    pub ntasks_per_node: Option<u32>,
    pub distribution: TaskDistribution,
    pub shared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: u64,
    pub submit_time: i64,
    pub eligible_time: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub suspend_time: Option<i64>,

    pub state: JobState,

    pub partition: String,
    pub account: String,
    pub uid: u32,
    pub gid: u32,
    pub qos_id: Option<u32>,
    pub association_id: Option<u64>,
    pub wckey_id: Option<u64>,
    pub reservation_id: Option<u64>,

    pub request: JobRequest,

    pub priority: i64,
    pub nice: i32,
    pub fairshare_component: f64,

    pub allocation: Option<JobResources>,

    pub steps: BTreeMap<StepId, Step>,

    pub exit_code: Option<i32>,
    pub requid: Option<u32>,
    pub comment: Option<String>,
    pub dependency: Option<String>,
    pub array_parent: Option<u64>,
}

impl Job {
    pub fn new(job_id: u64, submit_time: i64, partition: String, account: String, uid: u32, gid: u32, request: JobRequest) -> Self {
        Self {
            job_id,
            submit_time,
            eligible_time: submit_time,
            start_time: None,
            end_time: None,
            suspend_time: None,
            state: JobState::Pending,
            partition,
            account,
            uid,
            gid,
            qos_id: None,
            association_id: None,
            wckey_id: None,
            reservation_id: None,
            request,
            priority: 0,
            nice: 0,
            fairshare_component: 0.0,
            allocation: None,
            steps: BTreeMap::new(),
            exit_code: None,
            requid: None,
            comment: None,
            dependency: None,
            array_parent: None,
        }
    }

    /// I4: terminal jobs hold no allocation.
    pub fn clear_allocation(&mut self) {
        self.allocation = None;
    }

    pub fn is_running_or_suspended(&self) -> bool {
        matches!(self.state, JobState::Running | JobState::Suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> JobRequest {
        JobRequest {
            min_nodes: 1,
            max_nodes: None,
            min_cpus: 1,
            cpus_per_task: 1,
            pn_min_memory_mb: 1024,
            memory_scope: MemoryScope::PerNode,
            pn_min_cpus: 1,
            time_limit: std::time::Duration::from_secs(3600),
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

    #[test]
    fn terminal_states_exclude_active_ones() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Suspended.is_terminal());
        assert!(!JobState::Completing.is_terminal());
        assert!(!JobState::Resizing.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn new_job_starts_pending_with_no_allocation() {
        let j = Job::new(1, 100, "batch".to_string(), "acct".to_string(), 1000, 1000, req());
        assert_eq!(j.state, JobState::Pending);
        assert!(j.allocation.is_none());
    }
}
