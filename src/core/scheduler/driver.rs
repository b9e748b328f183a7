// src/core/scheduler/driver.rs

use super::priority::PriorityFn;
use crate::core::accounting::{AccountingStore, JobRecord};
use crate::core::bitmap::NodeBitmap;
use crate::core::errors::ClusterError;
use crate::core::model::step::StepId;
use crate::core::model::{Job, JobState, Partition};
use crate::core::select::{SelectMode, SelectOutcome, Selector};
use crate::core::state::ControllerState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A per-cycle budget: stop scheduling once either limit is hit (§4.4 step 6).
#[derive(Debug, Clone, Copy)]
pub struct CycleBudget {
    pub max_jobs: usize,
    pub max_duration: Duration,
}

impl Default for CycleBudget {
    fn default() -> Self {
        Self { max_jobs: 1000, max_duration: Duration::from_secs(2) }
    }
}

pub struct SchedulerDriver {
    state: Arc<ControllerState>,
    selector: Arc<dyn Selector>,
    priority_fn: Arc<dyn PriorityFn>,
    accounting: Arc<dyn AccountingStore>,
    cluster_name: String,
}

impl SchedulerDriver {
    pub fn new(
        state: Arc<ControllerState>,
        selector: Arc<dyn Selector>,
        priority_fn: Arc<dyn PriorityFn>,
        accounting: Arc<dyn AccountingStore>,
        cluster_name: String,
    ) -> Self {
        Self { state, selector, priority_fn, accounting, cluster_name }
    }

    fn node_matches_features(node_features: &[String], expr: &str) -> bool {
        expr.split('&')
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .all(|f| node_features.iter().any(|nf| nf == f))
    }

    fn candidate_bitmap(&self, job: &Job, partition: &Partition, nodes: &crate::core::state::NodeTable) -> NodeBitmap {
        let up = nodes.up_bitmap();
        let mut candidate = partition.node_bitmap.and(&up);

        if !job.request.required_nodelist.is_empty() {
            let required: NodeBitmap = NodeBitmap::from_indices(
                nodes.len(),
                job.request
                    .required_nodelist
                    .iter()
                    .filter_map(|n| nodes.find_by_name(n))
                    .map(|n| n.index),
            );
            candidate = candidate.and(&required);
        }

        if !job.request.excluded_nodelist.is_empty() {
            let excluded: NodeBitmap = NodeBitmap::from_indices(
                nodes.len(),
                job.request
                    .excluded_nodelist
                    .iter()
                    .filter_map(|n| nodes.find_by_name(n))
                    .map(|n| n.index),
            );
            candidate = candidate.sub(&excluded);
        }

        if let Some(expr) = &job.request.features {
            let matching = NodeBitmap::from_indices(
                nodes.len(),
                nodes
                    .nodes
                    .iter()
                    .filter(|n| {
                        n.config_ptr
                            .as_ref()
                            .map(|c| Self::node_matches_features(&c.features, expr))
                            .unwrap_or(false)
                    })
                    .map(|n| n.index),
            );
            candidate = candidate.and(&matching);
        }

        candidate
    }

    fn sharing_class(job: &Job, partition: &Partition) -> crate::core::model::NodeReq {
        use crate::core::model::{NodeReq, SharingPolicy};
        if matches!(partition.sharing, SharingPolicy::Exclusive) {
            NodeReq::Reserved
        } else if !job.request.shared {
            NodeReq::OneRow
        } else {
            NodeReq::Available
        }
    }

    /// Runs one scheduling pass over the pending queue in priority order
    /// (§4.4). Returns the number of jobs successfully started.
    pub async fn run_cycle(&self, now: i64, budget: CycleBudget) -> Result<usize, ClusterError> {
        let started_at = Instant::now();
        let mut started = 0usize;

        let mut pending: Vec<Job> = {
            let jobs = self.state.jobs.read().await;
            jobs.pending_in_submit_order().cloned().collect()
        };
        pending.sort_by_key(|j| std::cmp::Reverse(self.priority_fn.priority(j, now)));

        for job in pending {
            if started >= budget.max_jobs || started_at.elapsed() >= budget.max_duration {
                break;
            }

            let mut outcome = match self.try_select(&job).await? {
                Some(outcome) => outcome,
                None => continue,
            };

            // Step 5: a partition whose preempt_mode allows it may evict
            // running jobs from lower-priority partitions to make room,
            // then retry placement once (§8 S6).
            if matches!(outcome, SelectOutcome::InsufficientResources(_)) && self.preempt_for(&job, now).await? {
                if let Some(retried) = self.try_select(&job).await? {
                    outcome = retried;
                }
            }

            match outcome {
                SelectOutcome::Allocated(resources) => {
                    let alloc_cpus = resources.total_cpus();
                    self.state.set_job_allocation(job.job_id, resources, now).await?;
                    let record = JobRecord {
                        association: job.association_id,
                        wckey: job.wckey_id,
                        reservation_id: job.reservation_id,
                        eligible_time: job.eligible_time,
                        start: Some(now),
                        end: None,
                        alloc_cpus,
                        suspend_intervals: Vec::new(),
                    };
                    self.accounting.add_job_start(&self.cluster_name, job.job_id, record).await?;
                    self.accounting.add_step_start(&self.cluster_name, job.job_id, StepId::Batch, now).await?;
                    info!(job_id = job.job_id, "job allocated and started");
                    started += 1;
                }
                SelectOutcome::InsufficientResources(reason) => {
                    let mut jobs = self.state.jobs.write().await;
                    if let Some(j) = jobs.get_mut(job.job_id) {
                        j.comment = Some(reason);
                    }
                }
                SelectOutcome::Fatal(reason) => {
                    let mut jobs = self.state.jobs.write().await;
                    if let Some(j) = jobs.get_mut(job.job_id) {
                        j.state = JobState::Failed;
                        j.comment = Some(reason);
                        j.end_time = Some(now);
                    }
                }
                SelectOutcome::Feasible | SelectOutcome::WillRun(_) => {
                    // Only reachable if called in TestOnly/WillRun mode, which
                    // run_cycle never requests.
                }
            }
        }

        Ok(started)
    }

    /// Looks up `job`'s partition and asks the selector for a `RunNow`
    /// placement. Returns `None` (and logs) if the partition is missing or
    /// not currently schedulable, in which case the job is simply skipped
    /// this cycle rather than treated as a placement failure.
    async fn try_select(&self, job: &Job) -> Result<Option<SelectOutcome>, ClusterError> {
        let nodes = self.state.nodes.read().await;
        let partitions_map = self.state.partitions.read().await;

        let Some(partition) = partitions_map.get(&job.partition) else {
            warn!(job_id = job.job_id, partition = %job.partition, "job references unknown partition");
            return Ok(None);
        };
        if !partition.is_schedulable() {
            return Ok(None);
        }

        let candidate = self.candidate_bitmap(job, partition, &nodes);
        let node_req = Self::sharing_class(job, partition);
        let all_partitions: Vec<&Partition> = partitions_map.values().collect();

        let outcome = self.selector.select(job, &candidate, node_req, &nodes, &all_partitions, SelectMode::RunNow)?;
        Ok(Some(outcome))
    }

    /// Evicts running jobs from strictly-lower-priority partitions (or,
    /// failing that, from other same-priority partitions) that overlap
    /// `job`'s candidate nodes, applying `job`'s own partition's
    /// `preempt_mode` to each victim (§4.4 step 5). Returns whether any job
    /// was evicted; does not itself retry placement.
    async fn preempt_for(&self, job: &Job, now: i64) -> Result<bool, ClusterError> {
        let victims: Vec<u64> = {
            let nodes = self.state.nodes.read().await;
            let partitions_map = self.state.partitions.read().await;
            let jobs = self.state.jobs.read().await;

            let Some(own_partition) = partitions_map.get(&job.partition) else {
                return Ok(false);
            };
            if own_partition.preempt_mode == crate::config::PreemptMode::Off {
                return Ok(false);
            }
            let candidate = self.candidate_bitmap(job, own_partition, &nodes);

            let mut scored: Vec<(i32, u64)> = jobs
                .jobs
                .values()
                .filter(|victim| victim.is_running_or_suspended() && victim.partition != own_partition.name)
                .filter_map(|victim| {
                    let alloc = victim.allocation.as_ref()?;
                    if alloc.node_bitmap.and(&candidate).is_empty() {
                        return None;
                    }
                    let victim_partition = partitions_map.get(&victim.partition)?;
                    if victim_partition.priority <= own_partition.priority {
                        Some((victim_partition.priority, victim.job_id))
                    } else {
                        None
                    }
                })
                .collect();
            scored.sort();
            scored.into_iter().map(|(_, id)| id).collect()
        };

        if victims.is_empty() {
            return Ok(false);
        }

        for victim_id in victims {
            let mode = {
                let partitions_map = self.state.partitions.read().await;
                partitions_map.get(&job.partition).map(|p| p.preempt_mode)
            };
            let Some(mode) = mode else { break };

            let still_active = {
                let jobs = self.state.jobs.read().await;
                jobs.get(victim_id).map(|v| v.is_running_or_suspended()).unwrap_or(false)
            };
            if !still_active {
                continue;
            }

            // Release the victim's node/partition-row accounting first,
            // while it is still RUNNING, then transition its state last:
            // `apply_preemption` also clears `allocation`, which would make
            // a release afterwards a no-op.
            self.state.release_job_allocation(victim_id).await?;
            {
                let mut jobs = self.state.jobs.write().await;
                if let Some(victim) = jobs.get_mut(victim_id) {
                    super::preempt::apply_preemption(victim, mode, now);
                }
            }
            match mode {
                crate::config::PreemptMode::Suspend | crate::config::PreemptMode::Gang => {
                    self.accounting.add_job_suspend(&self.cluster_name, victim_id, now).await?;
                }
                crate::config::PreemptMode::Cancel | crate::config::PreemptMode::Requeue => {
                    self.accounting.add_job_end(&self.cluster_name, victim_id, now).await?;
                }
                crate::config::PreemptMode::Off => {}
            }
            warn!(job_id = victim_id, preempting_job = job.job_id, "job preempted to make room for a higher-priority job");
        }
        Ok(true)
    }
}
