// src/core/model/step.rs

use crate::core::bitmap::NodeBitmap;
use serde::{Deserialize, Serialize};

/// A step id is either a dense per-job counter or one of two pseudo ids
/// used for the implicit batch script step and the external/login step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepId {
    Batch,
    Extern,
    Id(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum StepState {
    Pending,
    Running,
    Suspended,
    Completed,
    Cancelled,
    Failed,
    Timeout,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running | StepState::Suspended)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepUsage {
    pub cpu_sec: u64,
    pub cpu_usec: u64,
    pub max_rss_kb: u64,
    pub max_vsize_kb: u64,
    pub max_pages: u64,
    pub min_cpu: u64,
    pub ave_rss_kb: f64,
    pub ave_vsize_kb: f64,
    pub energy_joules: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TaskDistribution {
    Block,
    Cyclic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: StepId,
    pub job_id: u64,

    #[serde(skip)]
    pub node_bitmap: NodeBitmap,

    pub state: StepState,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub suspended_time: Option<i64>,

    pub exit_code: Option<i32>,
    pub requid: Option<u32>,

    pub distribution: TaskDistribution,
    pub usage: StepUsage,
}

impl Step {
    pub fn new(step_id: StepId, job_id: u64, universe_len: usize, start_time: i64) -> Self {
        Self {
            step_id,
            job_id,
            node_bitmap: NodeBitmap::new(universe_len),
            state: StepState::Pending,
            start_time,
            end_time: None,
            suspended_time: None,
            exit_code: None,
            requid: None,
            distribution: TaskDistribution::Block,
            usage: StepUsage::default(),
        }
    }
}
