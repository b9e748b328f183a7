// src/core/select/topology3d.rs

//! Fixed-geometry block selector (§4.6): partitions a 3D coordinate space
//! into rectangular sub-blocks for systems with torus/mesh interconnects,
//! and subdivides midplane-sized blocks into the fixed "small block"
//! granularities {16, 32, 64, 128, 256} on demand.

use super::{SelectMode, SelectOutcome, Selector, WillRunResult};
use crate::core::bitmap::NodeBitmap;
use crate::core::errors::ClusterError;
use crate::core::model::{Job, JobResources, NodeReq, Partition};
use crate::core::state::NodeTable;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dims {
    pub fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub origin: (u32, u32, u32),
    pub dims: Dims,
}

impl Rect {
    fn fits(&self, req: &Dims) -> bool {
        // Try all six axis permutations of the request against this rect.
        let perms = [
            (req.x, req.y, req.z),
            (req.x, req.z, req.y),
            (req.y, req.x, req.z),
            (req.y, req.z, req.x),
            (req.z, req.x, req.y),
            (req.z, req.y, req.x),
        ];
        perms.iter().any(|&(a, b, c)| self.dims.x >= a && self.dims.y >= b && self.dims.z >= c)
    }

    fn is_exact(&self, req: &Dims) -> bool {
        self.dims == *req
    }

    fn volume(&self) -> u64 {
        self.dims.volume()
    }

    /// Splits along the earliest axis where this rect exceeds `req`,
    /// returning the half that covers `req` and the remainder.
    fn split(&self, req: &Dims) -> Option<(Rect, Rect)> {
        let (ox, oy, oz) = self.origin;
        if self.dims.x > req.x {
            let half_x = self.dims.x / 2;
            let a = Rect { origin: (ox, oy, oz), dims: Dims { x: half_x, ..self.dims } };
            let b = Rect { origin: (ox + half_x, oy, oz), dims: Dims { x: self.dims.x - half_x, ..self.dims } };
            return Some((a, b));
        }
        if self.dims.y > req.y {
            let half_y = self.dims.y / 2;
            let a = Rect { origin: (ox, oy, oz), dims: Dims { y: half_y, ..self.dims } };
            let b = Rect { origin: (ox, oy + half_y, oz), dims: Dims { y: self.dims.y - half_y, ..self.dims } };
            return Some((a, b));
        }
        if self.dims.z > req.z {
            let half_z = self.dims.z / 2;
            let a = Rect { origin: (ox, oy, oz), dims: Dims { z: half_z, ..self.dims } };
            let b = Rect { origin: (ox, oy, oz + half_z), dims: Dims { z: self.dims.z - half_z, ..self.dims } };
            return Some((a, b));
        }
        None
    }

    /// Two rects are face-adjacent and coalescable if they share a face and
    /// match spans in the other two dimensions.
    fn coalesces_with(&self, other: &Rect) -> Option<Rect> {
        let (ox, oy, oz) = self.origin;
        let (ox2, oy2, oz2) = other.origin;

        if oy == oy2 && oz == oz2 && self.dims.y == other.dims.y && self.dims.z == other.dims.z {
            if ox + self.dims.x == ox2 {
                return Some(Rect { origin: self.origin, dims: Dims { x: self.dims.x + other.dims.x, ..self.dims } });
            }
            if ox2 + other.dims.x == ox {
                return Some(Rect { origin: other.origin, dims: Dims { x: self.dims.x + other.dims.x, ..self.dims } });
            }
        }
        if ox == ox2 && oz == oz2 && self.dims.x == other.dims.x && self.dims.z == other.dims.z {
            if oy + self.dims.y == oy2 {
                return Some(Rect { origin: self.origin, dims: Dims { y: self.dims.y + other.dims.y, ..self.dims } });
            }
            if oy2 + other.dims.y == oy {
                return Some(Rect { origin: other.origin, dims: Dims { y: self.dims.y + other.dims.y, ..self.dims } });
            }
        }
        if ox == ox2 && oy == oy2 && self.dims.x == other.dims.x && self.dims.y == other.dims.y {
            if oz + self.dims.z == oz2 {
                return Some(Rect { origin: self.origin, dims: Dims { z: self.dims.z + other.dims.z, ..self.dims } });
            }
            if oz2 + other.dims.z == oz {
                return Some(Rect { origin: other.origin, dims: Dims { z: self.dims.z + other.dims.z, ..self.dims } });
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirePattern {
    A,
    B,
    C,
    D,
    E,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnType {
    Torus,
    Mesh,
}

#[derive(Debug, Clone, Copy)]
pub struct SwitchConnect {
    pub base_partition: (u32, u32, u32),
    pub axis: u8,
    pub pattern: WirePattern,
}

struct Inner {
    free: Vec<Rect>,
    allocated: HashMap<u64, Rect>,
    next_id: u64,
}

pub struct Topology3d {
    dims: Dims,
    inner: Mutex<Inner>,
}

impl Topology3d {
    pub fn new(dims: Dims) -> Self {
        Self {
            dims,
            inner: Mutex::new(Inner {
                free: vec![Rect { origin: (0, 0, 0), dims }],
                allocated: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Decomposes a requested volume into balanced power-of-two dimensions.
    pub fn normalize_request(&self, volume: u64) -> Result<Dims, String> {
        if !volume.is_power_of_two() && ![16u64, 32, 64, 128, 256].contains(&volume) {
            return Err(format!("request size {volume} is not a supported block granularity"));
        }
        let mut dx = 1u32;
        let mut dy = 1u32;
        let mut dz = 1u32;
        let mut remaining = volume;
        let mut axis = 0;
        while remaining > 1 {
            match axis % 3 {
                0 => dx *= 2,
                1 => dy *= 2,
                _ => dz *= 2,
            }
            remaining /= 2;
            axis += 1;
        }
        Ok(Dims { x: dx, y: dy, z: dz })
    }

    pub fn allocate(&self, req: Dims) -> Result<u64, String> {
        let mut inner = self.inner.lock().unwrap();
        Self::allocate_locked(&mut inner, &self.dims, req)
    }

    fn allocate_locked(inner: &mut Inner, dims: &Dims, req: Dims) -> Result<u64, String> {
        if let Some(pos) = inner.free.iter().position(|r| r.is_exact(&req)) {
            let rect = inner.free.remove(pos);
            return Ok(Self::commit_locked(inner, rect));
        }

        if let Some(pos) = inner
            .free
            .iter()
            .enumerate()
            .filter(|(_, r)| r.fits(&req))
            .min_by_key(|(_, r)| r.volume())
            .map(|(i, _)| i)
        {
            let rect = inner.free.remove(pos);
            if let Some((a, b)) = rect.split(&req) {
                inner.free.push(a);
                inner.free.push(b);
                return Self::allocate_locked(inner, dims, req);
            }
            return Ok(Self::commit_locked(inner, rect));
        }

        Err(format!("request {req:?} FAILS_TO_FIT in {dims:?}"))
    }

    /// Non-mutating feasibility check used by `TEST_ONLY`/`WILL_RUN` modes.
    fn can_fit(&self, req: &Dims) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.free.iter().any(|r| r.fits(req))
    }

    fn commit_locked(inner: &mut Inner, rect: Rect) -> u64 {
        let id = inner.next_id;
        inner.next_id += 1;
        inner.allocated.insert(id, rect);
        id
    }

    pub fn free_block(&self, id: u64) -> Result<(), String> {
        let mut inner = self.inner.lock().unwrap();
        let rect = inner.allocated.remove(&id).ok_or_else(|| format!("block {id} not allocated"))?;
        inner.free.push(rect);
        Self::coalesce_locked(&mut inner);
        Ok(())
    }

    fn coalesce_locked(inner: &mut Inner) {
        loop {
            let mut merged = None;
            'outer: for i in 0..inner.free.len() {
                for j in (i + 1)..inner.free.len() {
                    if let Some(combined) = inner.free[i].coalesces_with(&inner.free[j]) {
                        merged = Some((i, j, combined));
                        break 'outer;
                    }
                }
            }
            match merged {
                Some((i, j, combined)) => {
                    inner.free.remove(j);
                    inner.free.remove(i);
                    inner.free.push(combined);
                }
                None => break,
            }
        }
    }

    /// Deterministic small-block subdivision table (§4.6 step C), grounded
    /// in the original dynamic-block switch statement: maps a parent
    /// midplane size and a requested sub-midplane size onto the multiset of
    /// small blocks the parent is cut into.
    pub fn small_block_table(parent_size: u32, requested: u32) -> Vec<u32> {
        match (parent_size, requested) {
            (256, 16) => vec![16, 16, 32, 64, 128],
            (256, 32) => vec![32, 32, 64, 128],
            (256, 64) => vec![64, 64, 128],
            (256, 128) => vec![128, 128],
            (128, 16) => vec![16, 16, 32, 64],
            (128, 32) => vec![32, 32, 64],
            (128, 64) => vec![64, 64],
            (64, 16) => vec![16, 16, 32],
            (64, 32) => vec![32, 32],
            (32, 16) => vec![16, 16],
            _ => vec![requested],
        }
    }

    /// Wiring pattern for a base partition at `position` (0-indexed) out of
    /// `count` along one axis (§4.6 step D).
    pub fn wire_pattern(position: u32, count: u32, conn: ConnType) -> WirePattern {
        if count <= 1 {
            return WirePattern::A;
        }
        match (position == 0, position == count - 1, conn) {
            (true, _, ConnType::Torus) => WirePattern::B,
            (true, _, ConnType::Mesh) => WirePattern::A,
            (_, true, ConnType::Torus) => WirePattern::C,
            (_, true, ConnType::Mesh) => WirePattern::D,
            (false, false, ConnType::Torus) => WirePattern::E,
            (false, false, ConnType::Mesh) => WirePattern::F,
        }
    }

    fn free_rects(&self) -> Vec<Rect> {
        self.inner.lock().unwrap().free.clone()
    }

    fn allocated_rect(&self, id: u64) -> Option<Rect> {
        self.inner.lock().unwrap().allocated.get(&id).copied()
    }

    /// Maps an allocated rect onto the actual up, idle nodes whose `coords`
    /// fall inside it, intersected with `candidate_nodes`. Block allocation
    /// is exclusive-whole-node, so a partially-idle rect cannot be used.
    fn nodes_within(&self, rect: &Rect, candidate_nodes: &NodeBitmap, nodes: &NodeTable) -> Option<Vec<usize>> {
        let (ox, oy, oz) = rect.origin;
        let mut picked = Vec::new();
        for (idx, node) in nodes.nodes.iter().enumerate() {
            let Some(c) = node.coords else { continue };
            if c.x < ox || c.x >= ox + rect.dims.x {
                continue;
            }
            if c.y < oy || c.y >= oy + rect.dims.y {
                continue;
            }
            if c.z < oz || c.z >= oz + rect.dims.z {
                continue;
            }
            if !candidate_nodes.test(idx) || !node.is_idle() {
                return None;
            }
            picked.push(idx);
        }
        if picked.len() as u64 == rect.volume() {
            Some(picked)
        } else {
            None
        }
    }
}

impl Selector for Topology3d {
    fn select(
        &self,
        job: &Job,
        candidate_nodes: &NodeBitmap,
        node_req: NodeReq,
        nodes: &NodeTable,
        _partitions: &[&Partition],
        mode: SelectMode,
    ) -> Result<SelectOutcome, ClusterError> {
        let volume = job.request.min_nodes as u64;
        let req = self
            .normalize_request(volume)
            .map_err(|e| ClusterError::InvalidRequest(e))?;

        match mode {
            SelectMode::TestOnly => {
                if self.can_fit(&req) {
                    Ok(SelectOutcome::Feasible)
                } else {
                    Ok(SelectOutcome::InsufficientResources(format!(
                        "no free {volume}-node block available"
                    )))
                }
            }
            SelectMode::WillRun => {
                if self.can_fit(&req) {
                    Ok(SelectOutcome::WillRun(WillRunResult { earliest_start: crate::core::clock::now_unix(), victim_job_ids: Vec::new() }))
                } else {
                    Ok(SelectOutcome::InsufficientResources(format!(
                        "no free {volume}-node block available"
                    )))
                }
            }
            SelectMode::RunNow => {
                let id = match self.allocate(req) {
                    Ok(id) => id,
                    Err(e) => return Ok(SelectOutcome::InsufficientResources(e)),
                };
                let rect = self.allocated_rect(id).expect("just allocated");
                let Some(node_indices) = self.nodes_within(&rect, candidate_nodes, nodes) else {
                    // Coordinate space says the block is free but the actual
                    // nodes inside it are down or excluded; roll back.
                    self.free_block(id).ok();
                    return Ok(SelectOutcome::InsufficientResources(format!(
                        "topology block for {volume} nodes has no matching idle candidate nodes"
                    )));
                };

                let mut resources = JobResources::new(node_req, nodes.len());
                for idx in node_indices {
                    resources.node_bitmap.set(idx);
                    let cpus = nodes.nodes[idx].cpus;
                    let mem = nodes.nodes[idx].real_memory_mb;
                    resources.alloc_cpus.insert(idx, cpus);
                    resources.alloc_memory_mb.insert(idx, mem);
                    resources.node_list.push(nodes.nodes[idx].name.clone());
                }
                Ok(SelectOutcome::Allocated(resources))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_exact_fit() {
        let topo = Topology3d::new(Dims { x: 4, y: 4, z: 4 });
        let req = Dims { x: 4, y: 4, z: 4 };
        let id = topo.allocate(req).unwrap();
        assert_eq!(topo.allocated_rect(id).unwrap().dims, req);
        assert!(topo.free_rects().is_empty());
    }

    #[test]
    fn allocate_splits_and_leaves_remainder_free() {
        let topo = Topology3d::new(Dims { x: 4, y: 4, z: 4 });
        let req = Dims { x: 2, y: 4, z: 4 };
        topo.allocate(req).unwrap();
        let free = topo.free_rects();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].volume(), 32);
    }

    #[test]
    fn free_and_coalesce_restores_single_block() {
        let topo = Topology3d::new(Dims { x: 4, y: 4, z: 4 });
        let id = topo.allocate(Dims { x: 2, y: 4, z: 4 }).unwrap();
        topo.free_block(id).unwrap();
        let free = topo.free_rects();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].dims, Dims { x: 4, y: 4, z: 4 });
    }

    #[test]
    fn oversized_request_fails_to_fit() {
        let topo = Topology3d::new(Dims { x: 2, y: 2, z: 2 });
        let err = topo.allocate(Dims { x: 4, y: 4, z: 4 });
        assert!(err.is_err());
    }

    #[test]
    fn small_block_table_matches_known_case() {
        assert_eq!(Topology3d::small_block_table(256, 16), vec![16, 16, 32, 64, 128]);
    }

    #[test]
    fn wire_pattern_endpoints_differ_from_interior() {
        assert_eq!(Topology3d::wire_pattern(0, 4, ConnType::Torus), WirePattern::B);
        assert_eq!(Topology3d::wire_pattern(3, 4, ConnType::Torus), WirePattern::C);
        assert_eq!(Topology3d::wire_pattern(1, 4, ConnType::Torus), WirePattern::E);
    }
}
