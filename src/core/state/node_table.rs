// src/core/state/node_table.rs

use crate::core::bitmap::NodeBitmap;
use crate::core::model::{Node, NodeFlags, NodeState};
use std::collections::HashMap;

/// In-memory node table: dense `Vec<Node>` indexed by the same index the
/// bitmaps use, plus a name index for O(1) lookup by name.
#[derive(Debug, Default)]
pub struct NodeTable {
    pub nodes: Vec<Node>,
    pub by_name: HashMap<String, usize>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.by_name.get(name).and_then(|&i| self.nodes.get(i))
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Node> {
        let idx = *self.by_name.get(name)?;
        self.nodes.get_mut(idx)
    }

    /// Appends a node, assigning it the next dense index. Node bitmaps
    /// referring to earlier indices remain valid (the spec's tombstone
    /// design: nodes are never removed mid-array, only marked removed).
    pub fn insert(&mut self, mut node: Node) -> usize {
        let index = self.nodes.len();
        node.index = index;
        self.by_name.insert(node.name.clone(), index);
        self.nodes.push(node);
        index
    }

    pub fn up_bitmap(&self) -> NodeBitmap {
        NodeBitmap::from_indices(
            self.nodes.len(),
            self.nodes.iter().filter(|n| n.is_up()).map(|n| n.index),
        )
    }

    pub fn idle_bitmap(&self) -> NodeBitmap {
        NodeBitmap::from_indices(
            self.nodes.len(),
            self.nodes.iter().filter(|n| n.is_idle()).map(|n| n.index),
        )
    }

    pub fn completing_bitmap(&self) -> NodeBitmap {
        NodeBitmap::from_indices(
            self.nodes.len(),
            self.nodes
                .iter()
                .filter(|n| n.state == NodeState::Completing || n.flags.contains(NodeFlags::COMPLETING))
                .map(|n| n.index),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::NodeConfig;
    use std::sync::Arc;

    fn cfg() -> Arc<NodeConfig> {
        Arc::new(NodeConfig {
            name_pattern: "node".to_string(),
            cpus: 4,
            real_memory_mb: 4096,
            tmp_disk_mb: 0,
            cores: 4,
            sockets: 1,
            threads: 1,
            gres: Default::default(),
            features: Vec::new(),
        })
    }

    #[test]
    fn insert_assigns_dense_index() {
        let mut table = NodeTable::new();
        let i0 = table.insert(Node::new(0, "a", cfg()));
        let i1 = table.insert(Node::new(0, "b", cfg()));
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(table.find_by_name("b").unwrap().index, 1);
    }

    #[test]
    fn idle_bitmap_respects_drain() {
        let mut table = NodeTable::new();
        table.insert(Node::new(0, "a", cfg()));
        table.nodes[0].state = NodeState::Idle;
        assert!(table.idle_bitmap().test(0));
        table.nodes[0].flags.insert(NodeFlags::DRAIN);
        assert!(!table.idle_bitmap().test(0));
    }
}
