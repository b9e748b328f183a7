// src/core/state/store.rs

use super::job_table::JobTable;
use super::node_table::NodeTable;
use crate::core::errors::ClusterError;
use crate::core::model::{
    Job, JobRequest, JobResources, JobState, Node, NodeConfig, NodeFlags, NodeState, Partition, Reservation,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A closed or still-open node down/planned-maintenance interval, recorded
/// whenever [`ControllerState::mark_node_state`] transitions a node into or
/// out of DOWN. Feeds the hourly rollup's down/planned-down reconciliation
/// (§4.9) once `end` is known.
#[derive(Debug, Clone)]
pub struct NodeEventRecord {
    pub node_index: usize,
    pub start: i64,
    pub end: Option<i64>,
    pub maint: bool,
    pub cpu_count: u32,
}

/// Process-wide in-memory database (§4.1). Each named domain is its own
/// `RwLock`; callers that need more than one acquire them through
/// [`super::locks::StateLocks::sorted`] to respect the fixed order.
pub struct ControllerState {
    pub configs: RwLock<HashMap<String, Arc<NodeConfig>>>,
    pub jobs: RwLock<JobTable>,
    pub nodes: RwLock<NodeTable>,
    pub partitions: RwLock<HashMap<String, Partition>>,
    pub reservations: RwLock<HashMap<u64, Reservation>>,
    pub node_events: RwLock<Vec<NodeEventRecord>>,

    read_only: AtomicBool,
}

impl ControllerState {
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            jobs: RwLock::new(JobTable::new()),
            nodes: RwLock::new(NodeTable::new()),
            partitions: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
            node_events: RwLock::new(Vec::new()),
            read_only: AtomicBool::new(false),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    pub fn set_read_only(&self, value: bool) {
        self.read_only.store(value, Ordering::Release);
    }

    fn guard_writable(&self) -> Result<(), ClusterError> {
        if self.is_read_only() {
            Err(ClusterError::Internal(
                "controller state is read-only (checkpoint write failure or quorum loss)".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    // --- nodes -----------------------------------------------------------

    pub async fn lookup_node_by_name(&self, name: &str) -> Result<Node, ClusterError> {
        let nodes = self.nodes.read().await;
        nodes
            .find_by_name(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("node \"{name}\" not found")))
    }

    pub async fn list_nodes(&self) -> Vec<Node> {
        self.nodes.read().await.nodes.clone()
    }

    pub async fn create_node(
        &self,
        config_ref: Arc<NodeConfig>,
        name: impl Into<String>,
        coords: Option<crate::core::model::node::Coords>,
    ) -> Result<usize, ClusterError> {
        self.guard_writable()?;
        let name = name.into();
        let mut nodes = self.nodes.write().await;
        if nodes.find_by_name(&name).is_some() {
            return Err(ClusterError::Duplicate(format!("node \"{name}\" already exists")));
        }
        let mut node = Node::new(0, name, config_ref);
        node.coords = coords;
        Ok(nodes.insert(node))
    }

    /// Transitions a node's base state and/or flags. When the transition
    /// crosses the DOWN boundary (either direction), records a
    /// [`NodeEventRecord`] — opened with `now` as `start` on the way in,
    /// closed with `now` as `end` on the way out — so the hourly rollup has
    /// real down/planned-down history to reconcile against (§4.9).
    pub async fn mark_node_state(
        &self,
        name: &str,
        new_base: Option<NodeState>,
        set_flags: NodeFlags,
        clear_flags: NodeFlags,
        now: i64,
    ) -> Result<(), ClusterError> {
        self.guard_writable()?;
        let (node_index, prev_state, new_state, maint, cpu_count) = {
            let mut nodes = self.nodes.write().await;
            let node = nodes
                .find_by_name_mut(name)
                .ok_or_else(|| ClusterError::NotFound(format!("node \"{name}\" not found")))?;
            let prev_state = node.state;
            if let Some(base) = new_base {
                node.state = crate::core::node_machine::transition(node.state, base)?;
            }
            node.flags.insert(set_flags);
            node.flags.remove(clear_flags);
            (node.index, prev_state, node.state, node.flags.contains(NodeFlags::MAINT), node.cpus)
        };

        if prev_state != NodeState::Down && new_state == NodeState::Down {
            let mut events = self.node_events.write().await;
            events.push(NodeEventRecord { node_index, start: now, end: None, maint, cpu_count });
        } else if prev_state == NodeState::Down && new_state != NodeState::Down {
            let mut events = self.node_events.write().await;
            if let Some(rec) = events.iter_mut().rev().find(|e| e.node_index == node_index && e.end.is_none()) {
                rec.end = Some(now);
            }
        }
        Ok(())
    }

    // --- reservations --------------------------------------------------------

    pub async fn create_reservation(&self, reservation: Reservation) -> Result<(), ClusterError> {
        self.guard_writable()?;
        let mut reservations = self.reservations.write().await;
        if reservations.contains_key(&reservation.id) {
            return Err(ClusterError::Duplicate(format!("reservation {} already exists", reservation.id)));
        }
        reservations.insert(reservation.id, reservation);
        Ok(())
    }

    pub async fn list_reservations(&self) -> Vec<Reservation> {
        self.reservations.read().await.values().cloned().collect()
    }

    pub async fn register_node(
        &self,
        name: &str,
        fast_schedule: crate::config::FastSchedule,
        advertised_cpus: u32,
        advertised_memory_mb: u64,
        advertised_cores: u32,
        now: i64,
    ) -> Result<crate::core::node_machine::RegistrationOutcome, ClusterError> {
        self.guard_writable()?;
        let mut nodes = self.nodes.write().await;
        let index = *nodes
            .by_name
            .get(name)
            .ok_or_else(|| ClusterError::NotFound(format!("node \"{name}\" not found")))?;
        let config = nodes.nodes[index]
            .config_ptr
            .clone()
            .ok_or_else(|| ClusterError::Internal(format!("node \"{name}\" has no config template")))?;
        let node = &mut nodes.nodes[index];
        crate::core::node_machine::register_node(
            node,
            &config,
            fast_schedule,
            advertised_cpus,
            advertised_memory_mb,
            advertised_cores,
            now,
        )
    }

    // --- jobs --------------------------------------------------------------

    pub async fn create_job(
        &self,
        partition: String,
        account: String,
        uid: u32,
        gid: u32,
        request: JobRequest,
        now: i64,
    ) -> Result<u64, ClusterError> {
        self.guard_writable()?;
        if request.min_nodes == 0 {
            return Err(ClusterError::InvalidRequest("min_nodes must be nonzero".to_string()));
        }
        let mut jobs = self.jobs.write().await;
        let job_id = jobs.next_id();
        let job = Job::new(job_id, now, partition, account, uid, gid, request);
        jobs.insert(job);
        Ok(job_id)
    }

    pub async fn set_job_allocation(&self, job_id: u64, resources: JobResources, now: i64) -> Result<(), ClusterError> {
        self.guard_writable()?;
        let mut jobs = self.jobs.write().await;
        let mut nodes = self.nodes.write().await;
        let mut partitions = self.partitions.write().await;

        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| ClusterError::NotFound(format!("job {job_id} not found")))?;
        if job.state != JobState::Pending {
            return Err(ClusterError::ValidationFail(format!(
                "job {job_id} is not PENDING (state={})",
                job.state
            )));
        }

        for (&idx, &cpus) in &resources.alloc_cpus {
            let node = nodes
                .get_mut(idx)
                .ok_or_else(|| ClusterError::Internal(format!("allocation references unknown node index {idx}")))?;
            node.alloc_cpus += cpus;
            if let Some(&mem) = resources.alloc_memory_mb.get(&idx) {
                node.alloc_memory_mb += mem;
            }
            node.active_jobs.push(job_id);
            if node.state == NodeState::Idle {
                node.state = NodeState::Allocated;
            } else if node.state == NodeState::Allocated && node.active_jobs.len() > 1 {
                node.state = NodeState::Mixed;
            }
        }

        if let Some(row) = resources.row
            && let Some(partition) = partitions.get_mut(&job.partition)
        {
            while partition.rows.len() <= row {
                partition.rows.push(std::collections::BTreeMap::new());
            }
            for (&idx, core_bm) in &resources.core_bitmaps {
                let merged = match partition.rows[row].get(&idx) {
                    Some(existing) => existing.or(core_bm),
                    None => core_bm.clone(),
                };
                partition.rows[row].insert(idx, merged);
            }
        }

        job.allocation = Some(resources);
        job.state = JobState::Running;
        job.start_time = Some(now);
        Ok(())
    }

    pub async fn release_job_allocation(&self, job_id: u64) -> Result<(), ClusterError> {
        self.guard_writable()?;
        let mut jobs = self.jobs.write().await;
        let mut nodes = self.nodes.write().await;
        let mut partitions = self.partitions.write().await;

        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| ClusterError::NotFound(format!("job {job_id} not found")))?;

        if let Some(resources) = job.allocation.take() {
            for (&idx, &cpus) in &resources.alloc_cpus {
                if let Some(node) = nodes.get_mut(idx) {
                    node.alloc_cpus = node.alloc_cpus.saturating_sub(cpus);
                    if let Some(&mem) = resources.alloc_memory_mb.get(&idx) {
                        node.alloc_memory_mb = node.alloc_memory_mb.saturating_sub(mem);
                    }
                    node.active_jobs.retain(|&j| j != job_id);
                    if node.active_jobs.is_empty() && node.state != NodeState::Down {
                        node.state = NodeState::Idle;
                    } else if !node.active_jobs.is_empty() && node.state == NodeState::Mixed {
                        node.state = NodeState::Allocated;
                    }
                }
            }

            if let Some(row) = resources.row
                && let Some(partition) = partitions.get_mut(&job.partition)
                && let Some(row_map) = partition.rows.get_mut(row)
            {
                for (&idx, core_bm) in &resources.core_bitmaps {
                    if let Some(existing) = row_map.get(&idx) {
                        let cleared = existing.sub(core_bm);
                        if cleared.is_empty() {
                            row_map.remove(&idx);
                        } else {
                            row_map.insert(idx, cleared);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::job::MemoryScope;
    use crate::core::model::step::TaskDistribution;
    use crate::core::model::NodeReq;

    fn req() -> JobRequest {
        JobRequest {
            min_nodes: 1,
            max_nodes: None,
            min_cpus: 1,
            cpus_per_task: 1,
            pn_min_memory_mb: 1024,
            memory_scope: MemoryScope::PerNode,
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

    fn node_config() -> Arc<NodeConfig> {
        Arc::new(NodeConfig {
            name_pattern: "node".to_string(),
            cpus: 4,
            real_memory_mb: 8192,
            tmp_disk_mb: 0,
            cores: 4,
            sockets: 1,
            threads: 1,
            gres: Default::default(),
            features: Vec::new(),
        })
    }

    #[tokio::test]
    async fn create_job_then_allocate_and_release() {
        let state = ControllerState::new();
        let idx = state.create_node(node_config(), "node0", None).await.unwrap();
        state
            .mark_node_state("node0", Some(NodeState::Idle), NodeFlags::empty(), NodeFlags::empty(), 1000)
            .await
            .unwrap();

        let job_id = state
            .create_job("batch".to_string(), "acct".to_string(), 1000, 1000, req(), 1000)
            .await
            .unwrap();

        let mut resources = JobResources::new(NodeReq::Reserved, 1);
        resources.node_bitmap.set(idx);
        resources.alloc_cpus.insert(idx, 4);
        resources.alloc_memory_mb.insert(idx, 4096);

        state.set_job_allocation(job_id, resources, 1001).await.unwrap();
        {
            let nodes = state.nodes.read().await;
            assert_eq!(nodes.nodes[idx].alloc_cpus, 4);
            assert_eq!(nodes.nodes[idx].state, NodeState::Allocated);
        }

        state.release_job_allocation(job_id).await.unwrap();
        let nodes = state.nodes.read().await;
        assert_eq!(nodes.nodes[idx].alloc_cpus, 0);
        assert_eq!(nodes.nodes[idx].state, NodeState::Idle);
    }

    #[tokio::test]
    async fn duplicate_node_name_rejected() {
        let state = ControllerState::new();
        state.create_node(node_config(), "node0", None).await.unwrap();
        let err = state.create_node(node_config(), "node0", None).await;
        assert!(matches!(err, Err(ClusterError::Duplicate(_))));
    }
}
