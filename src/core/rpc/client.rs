// src/core/rpc/client.rs

//! Client <-> controller RPC semantics (§6.2).

use crate::core::model::job::JobRequest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBatchJob {
    pub partition: String,
    pub account: String,
    pub uid: u32,
    pub gid: u32,
    pub request: JobRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateResources {
    pub partition: String,
    pub account: String,
    pub uid: u32,
    pub gid: u32,
    pub request: JobRequest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KillJob {
    pub job_id: u64,
    pub signal: i32,
    pub requesting_uid: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompleteJob {
    pub job_id: u64,
    pub step_id: u32,
    pub rc: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadJobs {
    pub since_time: i64,
    pub requesting_uid: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadNodes {
    pub since_time: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadPartitions {
    pub since_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNode {
    pub name_expression: String,
    pub new_state: Option<crate::core::model::NodeState>,
    pub set_flags: crate::core::model::NodeFlags,
    pub clear_flags: crate::core::model::NodeFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePartition {
    pub name: String,
    pub new_state: Option<crate::core::model::PartitionState>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientRequest {
    SubmitBatchJob(SubmitBatchJob),
    AllocateResources(AllocateResources),
    KillJob(KillJob),
    CompleteJob(CompleteJob),
    LoadJobs(LoadJobs),
    LoadNodes(LoadNodes),
    LoadPartitions(LoadPartitions),
    UpdateNode(UpdateNode),
    UpdatePartition(UpdatePartition),
    Reconfigure,
}
