// src/core/model/partition.rs

use crate::config::PreemptMode;
use crate::core::bitmap::NodeBitmap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PartitionState {
    Up,
    Down,
    Drain,
    Inactive,
}

/// Partition sharing policy (§3.2). `Yes`/`Force` carry `k`, the maximum
/// number of jobs that may co-allocate a single CPU (partition "rows").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "k")]
pub enum SharingPolicy {
    Exclusive,
    No,
    Yes(u32),
    Force(u32),
}

impl SharingPolicy {
    /// Max partition rows (I5): exclusive/no-share are effectively 1 row.
    pub fn max_rows(&self) -> u32 {
        match self {
            SharingPolicy::Exclusive | SharingPolicy::No => 1,
            SharingPolicy::Yes(k) | SharingPolicy::Force(k) => (*k).max(1),
        }
    }

    pub fn forces_sharing(&self) -> bool {
        matches!(self, SharingPolicy::Force(_))
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PartitionFlags: u8 {
        /// Least-loaded-node-first placement.
        const LLN       = 0b001;
        const ROOT_ONLY = 0b010;
        const REQ_RESV  = 0b100;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub priority: i32,
    pub is_default: bool,
    pub hidden: bool,

    #[serde(skip)]
    pub node_bitmap: NodeBitmap,
    pub node_list: Vec<String>,

    pub max_time: Option<Duration>,
    pub default_time: Option<Duration>,
    pub max_nodes: Option<u32>,
    pub min_nodes: u32,
    pub max_cpus_per_node: Option<u32>,

    pub state: PartitionState,
    pub sharing: SharingPolicy,
    pub preempt_mode: PreemptMode,
    pub flags: PartitionFlags,

    /// Per-row bitmap of cores currently held by jobs in that row, indexed
    /// `[row][node_index] -> core bitmap`. Populated lazily as rows open.
    #[serde(skip)]
    pub rows: Vec<std::collections::BTreeMap<usize, NodeBitmap>>,
}

impl Partition {
    pub fn new(name: impl Into<String>, universe_len: usize) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            is_default: false,
            hidden: false,
            node_bitmap: NodeBitmap::new(universe_len),
            node_list: Vec::new(),
            max_time: None,
            default_time: None,
            max_nodes: None,
            min_nodes: 1,
            max_cpus_per_node: None,
            state: PartitionState::Up,
            sharing: SharingPolicy::Exclusive,
            preempt_mode: PreemptMode::Off,
            flags: PartitionFlags::empty(),
            rows: Vec::new(),
        }
    }

    pub fn is_schedulable(&self) -> bool {
        matches!(self.state, PartitionState::Up | PartitionState::Drain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_rows_matches_policy() {
        assert_eq!(SharingPolicy::Exclusive.max_rows(), 1);
        assert_eq!(SharingPolicy::No.max_rows(), 1);
        assert_eq!(SharingPolicy::Yes(4).max_rows(), 4);
        assert_eq!(SharingPolicy::Force(8).max_rows(), 8);
    }
}
