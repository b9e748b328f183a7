// src/core/rpc/node_agent.rs

//! Controller <-> node-agent RPC semantics (§6.1). Only message shapes and
//! the operations they trigger against the state store are specified here;
//! wire framing belongs to the transport layer, out of scope (§1).

use crate::core::model::node::GresMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNode {
    pub name: String,
    pub cpus: u32,
    pub real_memory_mb: u64,
    pub tmp_disk_mb: u64,
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
    pub gres: GresMap,
    pub boot_time: i64,
    pub slurmd_version: String,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegisterNodeResponse {
    Ack,
    ValidationFail { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub job_id: u64,
    pub step_id: Option<u32>,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub name: String,
    pub per_job_status: Vec<JobStatusEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchBatchJob {
    pub job_id: u64,
    pub step_id: u32,
    pub node_list: Vec<String>,
    pub resource_bits: Vec<u8>,
    pub env: Vec<(String, String)>,
    pub script: String,
    pub credentials: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchTasks {
    pub job_id: u64,
    pub step_id: u32,
    pub task_spec: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum FailureKind {
    NodeBusy,
    CredentialRejected,
    ScriptError,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LaunchResponse {
    Ack,
    Failure(FailureKind),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TerminateJob {
    pub job_id: u64,
    pub signal: i32,
    pub grace_sec: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompleteJob {
    pub job_id: u64,
    pub step_id: u32,
    pub exit_code: i32,
}

/// Messages a node agent may send to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeAgentRequest {
    RegisterNode(RegisterNode),
    Heartbeat(Heartbeat),
    CompleteJob(CompleteJob),
}

/// Messages the controller may send to a node agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerToAgentRequest {
    LaunchBatchJob(LaunchBatchJob),
    LaunchTasks(LaunchTasks),
    TerminateJob(TerminateJob),
    Reconfigure,
}
