// tests/scenarios.rs
//
// End-to-end scenarios exercising the scheduler driver, the topology block
// selector, the node heartbeat poll, and the accounting rollup together
// rather than in isolation.

use clusterd::config::PreemptMode;
use clusterd::core::accounting::rollup::{compute_hourly_rollup, JobRecord, ReservationRecord};
use clusterd::core::accounting::InMemoryAccountingStore;
use clusterd::core::agents::node_poll::NodePollAgent;
use clusterd::core::model::job::MemoryScope;
use clusterd::core::model::node::Coords;
use clusterd::core::model::{
    JobRequest, JobState, NodeConfig, NodeFlags, NodeState, Partition, PartitionFlags, SharingPolicy, TaskDistribution,
};
use clusterd::core::scheduler::{CycleBudget, DefaultPriority, SchedulerDriver};
use clusterd::core::select::topology3d::{Dims, Topology3d};
use clusterd::core::select::ConsRes;
use clusterd::core::state::ControllerState;
use std::sync::Arc;

fn node_config(cpus: u32, memory_mb: u64) -> Arc<NodeConfig> {
    Arc::new(NodeConfig {
        name_pattern: "node".to_string(),
        cpus,
        real_memory_mb: memory_mb,
        tmp_disk_mb: 0,
        cores: cpus,
        sockets: 1,
        threads: 1,
        gres: Default::default(),
        features: Vec::new(),
    })
}

fn job_request(min_cpus: u32, pn_min_memory_mb: u64, shared: bool) -> JobRequest {
    JobRequest {
        min_nodes: 1,
        max_nodes: None,
        min_cpus,
        cpus_per_task: 1,
        pn_min_memory_mb,
        memory_scope: MemoryScope::PerNode,
        pn_min_cpus: 1,
        time_limit: std::time::Duration::from_secs(3600),
        contiguous: false,
        features: None,
        gres: Vec::new(),
        nodelist: Vec::new(),
        excluded_nodelist: Vec::new(),
        required_nodelist: Vec::new(),
        ntasks_per_node: None,
        distribution: TaskDistribution::Block,
        shared,
    }
}

/// Creates `count` idle nodes and a schedulable partition covering all of
/// them, returning the node indices in creation order.
async fn make_partition(
    state: &ControllerState,
    partition_name: &str,
    priority: i32,
    preempt_mode: PreemptMode,
    sharing: SharingPolicy,
    node_cpus: u32,
    node_memory_mb: u64,
    node_count: usize,
) -> Vec<usize> {
    let mut indices = Vec::new();
    for i in 0..node_count {
        let idx = state
            .create_node(node_config(node_cpus, node_memory_mb), format!("{partition_name}-n{i}"), None)
            .await
            .unwrap();
        state
            .mark_node_state(&format!("{partition_name}-n{i}"), Some(NodeState::Idle), NodeFlags::empty(), NodeFlags::empty(), 0)
            .await
            .unwrap();
        indices.push(idx);
    }

    let universe_len = {
        let nodes = state.nodes.read().await;
        nodes.len()
    };
    let mut partition = Partition::new(partition_name, universe_len);
    partition.priority = priority;
    partition.preempt_mode = preempt_mode;
    partition.sharing = sharing;
    partition.flags = PartitionFlags::empty();
    for (i, &idx) in indices.iter().enumerate() {
        partition.node_bitmap.set(idx);
        partition.node_list.push(format!("{partition_name}-n{i}"));
    }

    state.partitions.write().await.insert(partition_name.to_string(), partition);
    indices
}

/// S1: a single exclusive-partition job lands on the only available node
/// and releases it cleanly on completion.
#[tokio::test]
async fn s1_single_node_exclusive_job_runs_and_releases() {
    let state = Arc::new(ControllerState::new());
    let indices = make_partition(&state, "batch", 0, PreemptMode::Off, SharingPolicy::Exclusive, 4, 4096, 1).await;
    let node_idx = indices[0];

    let job_id = state
        .create_job("batch".to_string(), "acct".to_string(), 1000, 1000, job_request(4, 512, false), 0)
        .await
        .unwrap();

    let driver = SchedulerDriver::new(
        state.clone(),
        Arc::new(ConsRes::default()),
        Arc::new(DefaultPriority::default()),
        Arc::new(InMemoryAccountingStore::new()),
        "test".to_string(),
    );
    let started = driver.run_cycle(100, CycleBudget::default()).await.unwrap();
    assert_eq!(started, 1);

    {
        let jobs = state.jobs.read().await;
        let job = jobs.get(job_id).unwrap();
        assert_eq!(job.state, JobState::Running);
        let resources = job.allocation.as_ref().unwrap();
        assert!(resources.node_bitmap.test(node_idx));

        let nodes = state.nodes.read().await;
        assert_eq!(nodes.get(node_idx).unwrap().state, NodeState::Allocated);
        assert_eq!(nodes.get(node_idx).unwrap().alloc_cpus, 4);
    }

    state.release_job_allocation(job_id).await.unwrap();
    let nodes = state.nodes.read().await;
    assert_eq!(nodes.get(node_idx).unwrap().state, NodeState::Idle);
    assert_eq!(nodes.get(node_idx).unwrap().alloc_cpus, 0);
}

/// S2: two jobs sharing a row-sharing partition's single node must be
/// handed disjoint core bitmaps.
#[tokio::test]
async fn s2_shared_partition_jobs_get_disjoint_core_bitmaps() {
    let state = Arc::new(ControllerState::new());
    make_partition(&state, "shared", 0, PreemptMode::Off, SharingPolicy::Yes(2), 4, 8192, 1).await;

    let job_a = state
        .create_job("shared".to_string(), "acct".to_string(), 1000, 1000, job_request(2, 512, true), 0)
        .await
        .unwrap();
    let job_b = state
        .create_job("shared".to_string(), "acct".to_string(), 1000, 1000, job_request(2, 512, true), 0)
        .await
        .unwrap();

    let driver = SchedulerDriver::new(
        state.clone(),
        Arc::new(ConsRes::default()),
        Arc::new(DefaultPriority::default()),
        Arc::new(InMemoryAccountingStore::new()),
        "test".to_string(),
    );
    let started = driver.run_cycle(100, CycleBudget::default()).await.unwrap();
    assert_eq!(started, 2);

    let jobs = state.jobs.read().await;
    let res_a = jobs.get(job_a).unwrap().allocation.as_ref().unwrap();
    let res_b = jobs.get(job_b).unwrap().allocation.as_ref().unwrap();

    for (&idx, cores_a) in &res_a.core_bitmaps {
        if let Some(cores_b) = res_b.core_bitmaps.get(&idx) {
            assert!(cores_a.and(cores_b).is_empty(), "overlapping core assignment on shared node {idx}");
        }
    }
}

/// S3: a 4x4x4 topology (volume 64) is exhausted by a 32+16+16 sequence;
/// a further request for 8 then FAILS_TO_FIT.
#[test]
fn s3_topology_exhausts_capacity_and_rejects_overflow() {
    let topo = Topology3d::new(Dims { x: 4, y: 4, z: 4 });

    let req32 = topo.normalize_request(32).unwrap();
    let req16 = topo.normalize_request(16).unwrap();
    let req8 = topo.normalize_request(8).unwrap();

    assert!(topo.allocate(req32).is_ok());
    assert!(topo.allocate(req16).is_ok());
    assert!(topo.allocate(req16).is_ok());

    let err = topo.allocate(req8);
    assert!(err.is_err());
}

/// S4: a node that misses its heartbeat past `t_down_secs` is marked DOWN
/// and any job running on it transitions to NODE_FAIL.
#[tokio::test]
async fn s4_unresponsive_node_goes_down_and_fails_its_job() {
    let state = Arc::new(ControllerState::new());
    let indices = make_partition(&state, "batch", 0, PreemptMode::Off, SharingPolicy::Exclusive, 4, 4096, 1).await;
    let node_idx = indices[0];

    let job_id = state
        .create_job("batch".to_string(), "acct".to_string(), 1000, 1000, job_request(1, 512, false), 0)
        .await
        .unwrap();
    let driver = SchedulerDriver::new(
        state.clone(),
        Arc::new(ConsRes::default()),
        Arc::new(DefaultPriority::default()),
        Arc::new(InMemoryAccountingStore::new()),
        "test".to_string(),
    );
    assert_eq!(driver.run_cycle(100, CycleBudget::default()).await.unwrap(), 1);

    {
        let mut nodes = state.nodes.write().await;
        nodes.get_mut(node_idx).unwrap().last_response = 100;
    }

    let agent = NodePollAgent::new(state.clone(), Arc::new(InMemoryAccountingStore::new()), "test".to_string(), 30, 120);

    let transitioned = agent.poll_once(140).await;
    assert_eq!(transitioned, 0);
    {
        let nodes = state.nodes.read().await;
        assert!(nodes.get(node_idx).unwrap().flags.contains(NodeFlags::NO_RESPOND));
        assert_eq!(nodes.get(node_idx).unwrap().state, NodeState::Allocated);
    }

    let transitioned = agent.poll_once(230).await;
    assert_eq!(transitioned, 1);

    let nodes = state.nodes.read().await;
    assert_eq!(nodes.get(node_idx).unwrap().state, NodeState::Down);
    let jobs = state.jobs.read().await;
    assert_eq!(jobs.get(job_id).unwrap().state, JobState::NodeFail);
}

/// S5: a reservation and a job that only partly overlaps an hourly window
/// are split correctly between reserved/allocated/idle CPU-seconds.
#[test]
fn s5_hourly_rollup_splits_reserved_and_allocated_time() {
    let reservation = ReservationRecord {
        id: 1,
        start: 600,
        end: 2400,
        maint: false,
        cpu_count: 4,
        associations: vec![100, 200],
    };
    let job = JobRecord {
        association: Some(1),
        wckey: None,
        reservation_id: None,
        eligible_time: 0,
        start: Some(0),
        end: Some(3600),
        alloc_cpus: 6,
        suspend_intervals: Vec::new(),
    };

    let rollup = compute_hourly_rollup(0, 10, &[], std::slice::from_ref(&reservation), std::slice::from_ref(&job));

    assert_eq!(rollup.total_time_secs, 36000);
    assert_eq!(rollup.alloc_cpu_secs.get(&(Some(1), None)).copied(), Some(21600));
    assert_eq!(rollup.alloc_cpu_secs.get(&(Some(100), None)).copied(), Some(3600));
    assert_eq!(rollup.alloc_cpu_secs.get(&(Some(200), None)).copied(), Some(3600));
    assert_eq!(rollup.reserved_cpu_secs, 7200);
    assert_eq!(rollup.idle_cpu_secs, 0);
    assert_eq!(rollup.overcommit_cpu_secs, 0);
}

/// S6: a high-priority exclusive partition with `preempt_mode = Cancel`
/// evicts a running job from a lower-priority partition to make room.
#[tokio::test]
async fn s6_high_priority_partition_preempts_lower_priority_job() {
    let state = Arc::new(ControllerState::new());

    // Both partitions share the same single 4-cpu node.
    let idx = state.create_node(node_config(4, 4096), "shared-node", None).await.unwrap();
    state
        .mark_node_state("shared-node", Some(NodeState::Idle), NodeFlags::empty(), NodeFlags::empty(), 0)
        .await
        .unwrap();

    let mut lo = Partition::new("lo", 1);
    lo.priority = 10;
    lo.preempt_mode = PreemptMode::Off;
    lo.sharing = SharingPolicy::Exclusive;
    lo.node_bitmap.set(idx);
    lo.node_list.push("shared-node".to_string());

    let mut hi = Partition::new("hi", 1);
    hi.priority = 100;
    hi.preempt_mode = PreemptMode::Cancel;
    hi.sharing = SharingPolicy::Exclusive;
    hi.node_bitmap.set(idx);
    hi.node_list.push("shared-node".to_string());

    {
        let mut partitions = state.partitions.write().await;
        partitions.insert("lo".to_string(), lo);
        partitions.insert("hi".to_string(), hi);
    }

    let driver = SchedulerDriver::new(
        state.clone(),
        Arc::new(ConsRes::default()),
        Arc::new(DefaultPriority::default()),
        Arc::new(InMemoryAccountingStore::new()),
        "test".to_string(),
    );

    let job_lo = state
        .create_job("lo".to_string(), "acct".to_string(), 1000, 1000, job_request(4, 512, false), 0)
        .await
        .unwrap();
    assert_eq!(driver.run_cycle(100, CycleBudget::default()).await.unwrap(), 1);
    {
        let jobs = state.jobs.read().await;
        assert_eq!(jobs.get(job_lo).unwrap().state, JobState::Running);
    }

    let job_hi = state
        .create_job("hi".to_string(), "acct".to_string(), 1000, 1000, job_request(4, 512, false), 0)
        .await
        .unwrap();
    assert_eq!(driver.run_cycle(200, CycleBudget::default()).await.unwrap(), 1);

    let jobs = state.jobs.read().await;
    assert_eq!(jobs.get(job_lo).unwrap().state, JobState::Preempted);
    assert_eq!(jobs.get(job_hi).unwrap().state, JobState::Running);
    let resources = jobs.get(job_hi).unwrap().allocation.as_ref().unwrap();
    assert!(resources.node_bitmap.test(idx));
}

/// Coordinates are honored by the topology selector even when `Topology3d`
/// is the cluster's configured selector instead of `ConsRes`.
#[tokio::test]
async fn topology_selector_places_job_on_matching_coordinate_block() {
    let state = Arc::new(ControllerState::new());
    let cfg = node_config(1, 1024);

    let mut indices = Vec::new();
    for x in 0..2u32 {
        for y in 0..2u32 {
            for z in 0..2u32 {
                let idx = state.create_node(cfg.clone(), format!("n{x}{y}{z}"), Some(Coords { x, y, z })).await.unwrap();
                state
                    .mark_node_state(&format!("n{x}{y}{z}"), Some(NodeState::Idle), NodeFlags::empty(), NodeFlags::empty(), 0)
                    .await
                    .unwrap();
                indices.push(idx);
            }
        }
    }

    let universe_len = state.nodes.read().await.len();
    let mut partition = Partition::new("block", universe_len);
    partition.priority = 0;
    partition.preempt_mode = PreemptMode::Off;
    partition.sharing = SharingPolicy::Exclusive;
    for &idx in &indices {
        partition.node_bitmap.set(idx);
    }
    state.partitions.write().await.insert("block".to_string(), partition);

    let selector = Arc::new(Topology3d::new(Dims { x: 2, y: 2, z: 2 }));
    let driver = SchedulerDriver::new(
        state.clone(),
        selector,
        Arc::new(DefaultPriority::default()),
        Arc::new(InMemoryAccountingStore::new()),
        "test".to_string(),
    );

    let job_id = state
        .create_job("block".to_string(), "acct".to_string(), 1000, 1000, job_request(1, 512, false), 0)
        .await
        .unwrap();
    assert_eq!(driver.run_cycle(100, CycleBudget::default()).await.unwrap(), 1);

    let jobs = state.jobs.read().await;
    assert_eq!(jobs.get(job_id).unwrap().state, JobState::Running);
}
