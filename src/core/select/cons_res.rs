// src/core/select/cons_res.rs

use super::gres::{GresMatcher, SimpleGresMatcher};
use super::{SelectMode, SelectOutcome, Selector, WillRunResult};
use crate::core::bitmap::NodeBitmap;
use crate::core::errors::ClusterError;
use crate::core::model::job::MemoryScope;
use crate::core::model::{Job, JobResources, NodeReq, Partition, PartitionFlags, TaskDistribution};
use crate::core::state::NodeTable;

/// The consumable-resource selector (§4.5): per-CPU/per-core accounting
/// with memory/GRES constraints, partition rows, and the fixed four-step
/// attempt sequence.
pub struct ConsRes {
    gres_matcher: Box<dyn GresMatcher>,
}

impl Default for ConsRes {
    fn default() -> Self {
        Self {
            gres_matcher: Box::new(SimpleGresMatcher),
        }
    }
}

impl ConsRes {
    pub fn new(gres_matcher: Box<dyn GresMatcher>) -> Self {
        Self { gres_matcher }
    }

    /// Computes the held (occupied) cores a node contributes to a placement
    /// attempt. `row_scope` controls which rows of each matching partition
    /// are consulted: `None` unions every row (the idle-capacity view used by
    /// steps 1-3), `Some(i)` looks at exactly row `i` (§4.5 step 4's
    /// `free = available \ row[i]`, not the union of all rows).
    fn held_cores(
        node_cores: u32,
        partitions: &[&Partition],
        node_index: usize,
        row_scope: Option<usize>,
        include: impl Fn(&Partition) -> bool,
    ) -> NodeBitmap {
        let mut held = NodeBitmap::new(node_cores as usize);
        for p in partitions {
            if !include(p) {
                continue;
            }
            match row_scope {
                Some(r) => {
                    if let Some(core_bits) = p.rows.get(r).and_then(|row| row.get(&node_index)) {
                        held = held.or(core_bits);
                    }
                }
                None => {
                    for row in &p.rows {
                        if let Some(core_bits) = row.get(&node_index) {
                            held = held.or(core_bits);
                        }
                    }
                }
            }
        }
        held
    }

    fn free_cores(node_cores: u32, held: &NodeBitmap) -> NodeBitmap {
        let full = NodeBitmap::from_indices(node_cores as usize, 0..node_cores as usize);
        full.and(&held.not())
    }

    fn cpus_per_core(cpus: u32, cores: u32) -> u32 {
        if cores == 0 { 0 } else { (cpus / cores).max(1) }
    }

    fn memory_allowed_cpus(&self, job: &Job, free_memory_mb: u64, node_cpus: u32) -> u32 {
        let req = &job.request;
        if req.pn_min_memory_mb == 0 {
            return node_cpus;
        }
        match req.memory_scope {
            MemoryScope::PerCpu => (free_memory_mb / req.pn_min_memory_mb) as u32,
            MemoryScope::PerNode => {
                if free_memory_mb >= req.pn_min_memory_mb {
                    node_cpus
                } else {
                    0
                }
            }
        }
    }

    fn total_cpus_required(job: &Job) -> u32 {
        let req = &job.request;
        let per_ntasks = req.ntasks_per_node.unwrap_or(1) * req.cpus_per_task * req.min_nodes.max(1);
        req.min_cpus.max(per_ntasks)
    }

    /// Attempts placement against a per-node free-core view produced by
    /// `held_filter`. Returns `None` if the job's requirements cannot be met.
    fn attempt(
        &self,
        job: &Job,
        candidate_nodes: &NodeBitmap,
        nodes: &NodeTable,
        partitions: &[&Partition],
        lln: bool,
        held_filter: impl Fn(&Partition) -> bool + Copy,
        row_scope: Option<usize>,
        row: usize,
    ) -> Option<JobResources> {
        let required_total = Self::total_cpus_required(job);
        let min_nodes = job.request.min_nodes.max(1);
        let max_nodes = job.request.max_nodes.unwrap_or(u32::MAX);

        let mut per_node_feasible: Vec<(usize, u32, NodeBitmap)> = Vec::new();
        for node_index in candidate_nodes.iter_set() {
            let node = nodes.get(node_index)?;
            if !node.is_schedulable() {
                continue;
            }
            let held = Self::held_cores(node.cores, partitions, node_index, row_scope, held_filter);
            let free = Self::free_cores(node.cores, &held);
            let free_core_count = free.count() as u32;
            let cpc = Self::cpus_per_core(node.cpus, node.cores);
            let core_limited_cpus = free_core_count * cpc;
            let mem_limited = self.memory_allowed_cpus(job, node.free_memory_mb(), node.cpus);
            let gres_limited = self.gres_matcher.gres_allowed_cpus(&node.gres, &job.request.gres, node.cpus);
            let feasible = core_limited_cpus.min(mem_limited).min(gres_limited);
            if feasible > 0 {
                per_node_feasible.push((node_index, feasible, free));
            }
        }

        if lln {
            per_node_feasible.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        } else {
            per_node_feasible.sort_by_key(|(idx, ..)| *idx);
        }

        let mut chosen: Vec<(usize, u32, NodeBitmap)> = Vec::new();
        let mut acc_cpus = 0u32;
        for entry in per_node_feasible {
            if chosen.len() as u32 >= max_nodes {
                break;
            }
            acc_cpus += entry.1;
            chosen.push(entry);
            if acc_cpus >= required_total && chosen.len() as u32 >= min_nodes {
                break;
            }
        }

        if acc_cpus < required_total || (chosen.len() as u32) < min_nodes {
            return None;
        }

        Some(self.build_allocation(job, &chosen, nodes, row))
    }

    fn build_allocation(&self, job: &Job, chosen: &[(usize, u32, NodeBitmap)], nodes: &NodeTable, row: usize) -> JobResources {
        let universe_len = nodes.len();
        let node_req = if job.request.shared {
            NodeReq::Available
        } else {
            NodeReq::Reserved
        };
        let mut resources = JobResources::new(node_req, universe_len);
        resources.row = Some(row);
        let required_total = Self::total_cpus_required(job);

        let assignments = match job.request.distribution {
            TaskDistribution::Block => Self::assign_block(chosen, required_total),
            TaskDistribution::Cyclic => Self::assign_cyclic(chosen, nodes, required_total),
        };

        for (node_index, take_cpus, assigned_cores) in assignments {
            let node = nodes.get(node_index).expect("chosen node exists");
            resources.node_bitmap.set(node_index);
            resources.node_list.push(node.name.clone());
            resources.core_bitmaps.insert(node_index, assigned_cores);
            resources.alloc_cpus.insert(node_index, take_cpus);
            let mem = match job.request.memory_scope {
                MemoryScope::PerCpu => take_cpus as u64 * job.request.pn_min_memory_mb,
                MemoryScope::PerNode => job.request.pn_min_memory_mb,
            };
            resources.alloc_memory_mb.insert(node_index, mem);
        }

        resources
    }

    /// BLOCK distribution (§4.5 `cr_dist`): fill each chosen node to its
    /// feasible share, in order, before moving to the next node.
    fn assign_block(chosen: &[(usize, u32, NodeBitmap)], required_total: u32) -> Vec<(usize, u32, NodeBitmap)> {
        let mut remaining = required_total;
        let mut out = Vec::with_capacity(chosen.len());
        for (node_index, feasible, free) in chosen {
            let take_cpus = remaining.min(*feasible);
            if take_cpus == 0 {
                break;
            }
            let mut bm = NodeBitmap::new(free.len());
            let mut taken = 0u32;
            for core in free.iter_set() {
                if taken >= take_cpus {
                    break;
                }
                bm.set(core);
                taken += 1;
            }
            out.push((*node_index, take_cpus, bm));
            remaining = remaining.saturating_sub(take_cpus);
        }
        out
    }

    /// CYCLIC distribution (§4.5 `cr_dist`): round-robin over the chosen
    /// nodes, handing out one core per node per pass, so a multi-node job's
    /// per-node cpu counts differ from BLOCK's fill-then-move-on shape.
    fn assign_cyclic(chosen: &[(usize, u32, NodeBitmap)], nodes: &NodeTable, required_total: u32) -> Vec<(usize, u32, NodeBitmap)> {
        struct NodeCursor {
            node_index: usize,
            cpc: u32,
            feasible: u32,
            free_cores: Vec<usize>,
            taken_cores: usize,
            taken_cpus: u32,
            bitmap_len: usize,
        }

        let mut cursors: Vec<NodeCursor> = chosen
            .iter()
            .filter_map(|(node_index, feasible, free)| {
                let node = nodes.get(*node_index)?;
                Some(NodeCursor {
                    node_index: *node_index,
                    cpc: Self::cpus_per_core(node.cpus, node.cores).max(1),
                    feasible: *feasible,
                    free_cores: free.iter_set().collect(),
                    taken_cores: 0,
                    taken_cpus: 0,
                    bitmap_len: free.len(),
                })
            })
            .collect();

        let mut remaining = required_total;
        loop {
            let mut progressed = false;
            for cursor in cursors.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if cursor.taken_cpus >= cursor.feasible || cursor.taken_cores >= cursor.free_cores.len() {
                    continue;
                }
                let take = cursor.cpc.min(remaining).min(cursor.feasible - cursor.taken_cpus);
                if take == 0 {
                    continue;
                }
                cursor.taken_cores += 1;
                cursor.taken_cpus += take;
                remaining = remaining.saturating_sub(take);
                progressed = true;
            }
            if remaining == 0 || !progressed {
                break;
            }
        }

        cursors
            .into_iter()
            .filter(|c| c.taken_cpus > 0)
            .map(|c| {
                let mut bm = NodeBitmap::new(c.bitmap_len);
                for &core in c.free_cores.iter().take(c.taken_cores) {
                    bm.set(core);
                }
                (c.node_index, c.taken_cpus, bm)
            })
            .collect()
    }
}

impl Selector for ConsRes {
    fn select(
        &self,
        job: &Job,
        candidate_nodes: &NodeBitmap,
        node_req: NodeReq,
        nodes: &NodeTable,
        partitions: &[&Partition],
        mode: SelectMode,
    ) -> Result<SelectOutcome, ClusterError> {
        let this_partition = partitions
            .iter()
            .find(|p| p.name == job.partition)
            .ok_or_else(|| ClusterError::Internal(format!("partition \"{}\" not found for job {}", job.partition, job.job_id)))?;
        let lln = this_partition.flags.contains(PartitionFlags::LLN);
        let own_priority = this_partition.priority;
        let no_share = matches!(node_req, NodeReq::Reserved);

        // Step 1: idle-only, excludes every partition's rows.
        if let Some(resources) = self.attempt(job, candidate_nodes, nodes, partitions, lln, |_| true, None, 0) {
            return self.finish(job, resources, mode, nodes);
        }
        if no_share && mode == SelectMode::RunNow {
            return Ok(SelectOutcome::InsufficientResources(
                "no idle capacity available for a non-sharing job".to_string(),
            ));
        }

        // Steps 2 and 3 report feasibility as if lower/equal-priority partitions
        // were preemptable, for TEST_ONLY/WILL_RUN previews. A RunNow commit
        // never takes this path: it would double-book cores a running job in
        // another partition still physically holds. Real preemption happens
        // in the scheduler driver (eviction, then a fresh RunNow retry).
        if mode != SelectMode::RunNow {
            // Step 2: exclude only strictly-higher-priority partitions whose preempt_mode forbids eviction.
            if let Some(resources) = self.attempt(
                job,
                candidate_nodes,
                nodes,
                partitions,
                lln,
                |p| p.priority > own_priority && p.preempt_mode == crate::config::PreemptMode::Off,
                None,
                0,
            ) {
                return self.finish(job, resources, mode, nodes);
            }

            // Step 3: also exclude same-priority partitions' cores.
            if let Some(resources) = self.attempt(
                job,
                candidate_nodes,
                nodes,
                partitions,
                lln,
                |p| p.priority >= own_priority && p.preempt_mode == crate::config::PreemptMode::Off,
                None,
                0,
            ) {
                return self.finish(job, resources, mode, nodes);
            }
        }

        if no_share {
            return Ok(SelectOutcome::InsufficientResources(
                "no idle capacity available for a non-sharing job".to_string(),
            ));
        }

        // Step 4: try each of this partition's own rows in turn. `free = available \ row[i]`:
        // a row beyond the partition's current row count is simply empty (a fresh row).
        let max_rows = this_partition.sharing.max_rows();
        for row in 0..=max_rows {
            let row = row as usize;
            if let Some(resources) = self.attempt(
                job,
                candidate_nodes,
                nodes,
                partitions,
                lln,
                |p| p.name == job.partition,
                Some(row),
                row,
            ) {
                return self.finish(job, resources, mode, nodes);
            }
            if row as u32 >= max_rows {
                break;
            }
        }

        Ok(SelectOutcome::InsufficientResources(format!(
            "job {} does not fit within partition \"{}\" row budget",
            job.job_id, job.partition
        )))
    }
}

impl ConsRes {
    fn finish(&self, job: &Job, resources: JobResources, mode: SelectMode, _nodes: &NodeTable) -> Result<SelectOutcome, ClusterError> {
        match mode {
            SelectMode::TestOnly => Ok(SelectOutcome::Feasible),
            SelectMode::RunNow => Ok(SelectOutcome::Allocated(resources)),
            SelectMode::WillRun => Ok(SelectOutcome::WillRun(WillRunResult {
                earliest_start: job.submit_time,
                victim_job_ids: Vec::new(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::job::MemoryScope as MS;
    use crate::core::model::{Job, JobRequest, NodeConfig, TaskDistribution};
    use std::sync::Arc;

    fn node_config(cpus: u32, mem: u64) -> Arc<NodeConfig> {
        Arc::new(NodeConfig {
            name_pattern: "node".to_string(),
            cpus,
            real_memory_mb: mem,
            tmp_disk_mb: 0,
            cores: cpus,
            sockets: 1,
            threads: 1,
            gres: Default::default(),
            features: Vec::new(),
        })
    }

    fn job_req(min_nodes: u32, min_cpus: u32, mem: u64) -> JobRequest {
        JobRequest {
            min_nodes,
            max_nodes: None,
            min_cpus,
            cpus_per_task: 1,
            pn_min_memory_mb: mem,
            memory_scope: MS::PerNode,
            pn_min_cpus: 1,
            time_limit: std::time::Duration::from_secs(60),
            contiguous: false,
            features: None,
            gres: Vec::new(),
            nodelist: Vec::new(),
            excluded_nodelist: Vec::new(),
            required_nodelist: Vec::new(),
            ntasks_per_node: None,
            distribution: TaskDistribution::Block,
            shared: false,
        }
    }

    #[test]
    fn places_single_node_job_on_idle_node() {
        use crate::core::model::{Node, NodeState};

        let mut nodes = NodeTable::new();
        let mut n = Node::new(0, "node0", node_config(4, 8192));
        n.state = NodeState::Idle;
        nodes.insert(n);

        let mut partition = Partition::new("batch", 1);
        partition.node_bitmap.set(0);
        partition.priority = 1;

        let job = Job::new(1, 0, "batch".to_string(), "acct".to_string(), 1000, 1000, job_req(1, 2, 1024));

        let selector = ConsRes::default();
        let candidate = NodeBitmap::from_indices(1, [0]);
        let outcome = selector
            .select(&job, &candidate, NodeReq::Reserved, &nodes, &[&partition], SelectMode::RunNow)
            .unwrap();

        match outcome {
            SelectOutcome::Allocated(res) => {
                assert!(res.node_bitmap.test(0));
                assert_eq!(res.alloc_cpus[&0], 2);
            }
            other => panic!("expected Allocated, got {other:?}"),
        }
    }

    #[test]
    fn insufficient_resources_when_no_node_fits() {
        use crate::core::model::{Node, NodeState};

        let mut nodes = NodeTable::new();
        let mut n = Node::new(0, "node0", node_config(2, 1024));
        n.state = NodeState::Idle;
        nodes.insert(n);

        let mut partition = Partition::new("batch", 1);
        partition.node_bitmap.set(0);

        let job = Job::new(1, 0, "batch".to_string(), "acct".to_string(), 1000, 1000, job_req(1, 8, 1024));

        let selector = ConsRes::default();
        let candidate = NodeBitmap::from_indices(1, [0]);
        let outcome = selector
            .select(&job, &candidate, NodeReq::Reserved, &nodes, &[&partition], SelectMode::RunNow)
            .unwrap();
        assert!(matches!(outcome, SelectOutcome::InsufficientResources(_)));
    }
}
