// src/core/model/job_resources.rs

use crate::core::bitmap::NodeBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sharing class a running job occupies a node under (§3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeReq {
    /// Exclusive hold; node removed from every other partition's availability.
    Reserved,
    /// Shared, but this job forbids other jobs from sharing its rows.
    OneRow,
    /// Fully shared, subject to normal row accounting.
    Available,
}

/// The bit-exact record of what a running job owns (§3.6). Bitmaps are
/// owned by the job for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResources {
    pub node_bitmap: NodeBitmap,
    pub node_list: Vec<String>,

    /// Per-node core bitmap, keyed by node index, concatenated in canonical
    /// node-list order when serialized for display.
    pub core_bitmaps: BTreeMap<usize, NodeBitmap>,

    pub alloc_cpus: BTreeMap<usize, u32>,
    pub alloc_memory_mb: BTreeMap<usize, u64>,
    pub used_memory_mb: BTreeMap<usize, u64>,

    pub node_req: NodeReq,

    /// Which row of the owning partition's `rows` table this allocation's
    /// core bitmaps were merged into, if any. `None` for selectors (the
    /// topology block selector) that rely on whole-node idle state instead
    /// of partition row accounting.
    pub row: Option<usize>,
}

impl JobResources {
    pub fn new(node_req: NodeReq, universe_len: usize) -> Self {
        Self {
            node_bitmap: NodeBitmap::new(universe_len),
            node_list: Vec::new(),
            core_bitmaps: BTreeMap::new(),
            alloc_cpus: BTreeMap::new(),
            alloc_memory_mb: BTreeMap::new(),
            used_memory_mb: BTreeMap::new(),
            node_req,
            row: None,
        }
    }

    pub fn total_cpus(&self) -> u32 {
        self.alloc_cpus.values().sum()
    }

    pub fn total_memory_mb(&self) -> u64 {
        self.alloc_memory_mb.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.node_bitmap.is_empty()
    }
}
