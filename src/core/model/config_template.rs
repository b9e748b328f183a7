// src/core/model/config_template.rs

use super::node::GresMap;
use serde::{Deserialize, Serialize};

/// Declared resources and features shared by every node created from it
/// (spec §3.5). Reference-counted via `Arc` so many nodes can point at the
/// same template without duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub name_pattern: String,
    pub cpus: u32,
    pub real_memory_mb: u64,
    pub tmp_disk_mb: u64,
    pub cores: u32,
    pub sockets: u32,
    pub threads: u32,
    pub gres: GresMap,
    pub features: Vec<String>,
}

impl NodeConfig {
    /// True if advertised resources meet or exceed this template (I8).
    pub fn satisfied_by(&self, cpus: u32, real_memory_mb: u64, cores: u32) -> bool {
        cpus >= self.cpus && real_memory_mb >= self.real_memory_mb && cores >= self.cores
    }
}
