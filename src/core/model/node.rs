// src/core/model/node.rs

use super::config_template::NodeConfig;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Base node state (spec §3.1, §4.3). Flag bits overlay this and are tracked
/// separately in [`NodeFlags`] since several of them are orthogonal to the
/// base (a node can be DOWN and DRAIN at once).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum NodeState {
    Unknown,
    Down,
    Idle,
    Allocated,
    Completing,
    Mixed,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NodeFlags: u16 {
        const DRAIN       = 0b0000_0001;
        const FAIL        = 0b0000_0010;
        const NO_RESPOND  = 0b0000_0100;
        const POWER_SAVE  = 0b0000_1000;
        const MAINT       = 0b0001_0000;
        const RESERVED    = 0b0010_0000;
        const COMPLETING  = 0b0100_0000;
    }
}

/// A countable generic resource (GPU, license, etc). `count` is the total
/// advertised quantity; `allocated` tracks how much is currently consumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GresEntry {
    pub count: u32,
    pub allocated: u32,
}

pub type GresMap = BTreeMap<String, GresEntry>;

/// Optional 3D coordinates used by the topology selector (§4.6). Absent for
/// clusters that use the consumable-resource selector only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coords {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub index: usize,
    pub state: NodeState,
    pub flags: NodeFlags,
    pub last_response: i64,

    pub cpus: u32,
    pub real_memory_mb: u64,
    pub tmp_disk_mb: u64,
    pub cores: u32,
    pub sockets: u32,
    pub threads: u32,
    pub gres: GresMap,

    pub alloc_cpus: u32,
    pub alloc_memory_mb: u64,

    #[serde(skip)]
    pub config_ptr: Option<Arc<NodeConfig>>,

    pub partitions: Vec<String>,
    pub coords: Option<Coords>,

    /// Active jobs currently holding resources on this node (I1).
    pub active_jobs: Vec<u64>,
}

impl Node {
    pub fn new(index: usize, name: impl Into<String>, config_ptr: Arc<NodeConfig>) -> Self {
        let cfg = config_ptr.as_ref();
        Self {
            name: name.into(),
            index,
            state: NodeState::Unknown,
            flags: NodeFlags::empty(),
            last_response: 0,
            cpus: cfg.cpus,
            real_memory_mb: cfg.real_memory_mb,
            tmp_disk_mb: cfg.tmp_disk_mb,
            cores: cfg.cores,
            sockets: cfg.sockets,
            threads: cfg.threads,
            gres: cfg.gres.clone(),
            alloc_cpus: 0,
            alloc_memory_mb: 0,
            config_ptr: Some(config_ptr),
            partitions: Vec::new(),
            coords: None,
            active_jobs: Vec::new(),
        }
    }

    pub fn free_cpus(&self) -> u32 {
        self.cpus.saturating_sub(self.alloc_cpus)
    }

    pub fn free_memory_mb(&self) -> u64 {
        self.real_memory_mb.saturating_sub(self.alloc_memory_mb)
    }

    /// I3: membership in the "idle" bitmap.
    pub fn is_idle(&self) -> bool {
        self.state == NodeState::Idle
            && !self
                .flags
                .intersects(NodeFlags::DRAIN | NodeFlags::FAIL)
    }

    /// I3: membership in the "up" bitmap.
    pub fn is_up(&self) -> bool {
        !matches!(self.state, NodeState::Down | NodeState::Unknown) && !self.flags.contains(NodeFlags::DRAIN)
    }

    pub fn is_schedulable(&self) -> bool {
        self.is_up() && !self.flags.intersects(NodeFlags::DRAIN | NodeFlags::FAIL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Arc<NodeConfig> {
        Arc::new(NodeConfig {
            name_pattern: "node".to_string(),
            cpus: 4,
            real_memory_mb: 8192,
            tmp_disk_mb: 0,
            cores: 4,
            sockets: 1,
            threads: 1,
            gres: GresMap::new(),
            features: Vec::new(),
        })
    }

    #[test]
    fn idle_respects_drain_flag() {
        let mut n = Node::new(0, "node1", cfg());
        n.state = NodeState::Idle;
        assert!(n.is_idle());
        n.flags.insert(NodeFlags::DRAIN);
        assert!(!n.is_idle());
    }

    #[test]
    fn up_excludes_down_and_drain() {
        let mut n = Node::new(0, "node1", cfg());
        n.state = NodeState::Idle;
        assert!(n.is_up());
        n.state = NodeState::Down;
        assert!(!n.is_up());
        n.state = NodeState::Idle;
        n.flags.insert(NodeFlags::DRAIN);
        assert!(!n.is_up());
    }

    #[test]
    fn free_resources_saturate() {
        let mut n = Node::new(0, "node1", cfg());
        n.alloc_cpus = 10;
        assert_eq!(n.free_cpus(), 0);
    }
}
