// src/core/select/mod.rs

//! Pluggable node-selection algorithms (§4.5, §4.6). The original dispatches
//! on a `select_type` tag into a shared void* plugin ABI; here the two
//! algorithms differ enough in their actual per-call logic that a trait is
//! the more honest generalization than an enum wrapping both.

pub mod cons_res;
pub mod gres;
pub mod topology3d;

use crate::core::bitmap::NodeBitmap;
use crate::core::errors::ClusterError;
use crate::core::model::{Job, JobResources, NodeReq, Partition};
use crate::core::state::NodeTable;

pub use cons_res::ConsRes;
pub use gres::GresMatcher;
pub use topology3d::Topology3d;

/// Selection mode (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Commit the allocation if feasible.
    RunNow,
    /// Check feasibility only; no state change.
    TestOnly,
    /// Ignore running jobs preemptible under the partition's preempt_mode;
    /// report earliest start time and victims instead of committing.
    WillRun,
}

/// Outcome of a `WillRun` query: the earliest time the job could start and
/// which running jobs would need to be evicted to make room.
#[derive(Debug, Clone)]
pub struct WillRunResult {
    pub earliest_start: i64,
    pub victim_job_ids: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum SelectOutcome {
    Allocated(JobResources),
    WillRun(WillRunResult),
    Feasible,
    InsufficientResources(String),
    /// The request can never be satisfied by this cluster, regardless of
    /// current load (e.g. it exceeds total installed capacity).
    Fatal(String),
}

pub trait Selector: Send + Sync {
    /// Attempts to place `job` onto some subset of `candidate_nodes`, given
    /// the sharing class `node_req` and the current node/partition state.
    fn select(
        &self,
        job: &Job,
        candidate_nodes: &NodeBitmap,
        node_req: NodeReq,
        nodes: &NodeTable,
        partitions: &[&Partition],
        mode: SelectMode,
    ) -> Result<SelectOutcome, ClusterError>;
}
