// src/core/scheduler/preempt.rs

use crate::config::PreemptMode;
use crate::core::model::{Job, JobState};

/// Applies a partition's preempt_mode to a victim job chosen for eviction
/// (§4.4 step 5, §8 S6). Returns the job's new state; `Suspend`/`Gang`
/// leave the job SUSPENDED rather than terminal so it can resume later.
pub fn apply_preemption(victim: &mut Job, mode: PreemptMode, now: i64) {
    match mode {
        PreemptMode::Off => {}
        PreemptMode::Cancel => {
            victim.state = JobState::Preempted;
            victim.end_time = Some(now);
            victim.clear_allocation();
        }
        PreemptMode::Requeue => {
            victim.state = JobState::Pending;
            victim.start_time = None;
            victim.clear_allocation();
        }
        PreemptMode::Suspend | PreemptMode::Gang => {
            victim.state = JobState::Suspended;
            victim.suspend_time = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::job::MemoryScope;
    use crate::core::model::{JobRequest, TaskDistribution};

    fn job() -> Job {
        let req = JobRequest {
            min_nodes: 1,
            max_nodes: None,
            min_cpus: 1,
            cpus_per_task: 1,
            pn_min_memory_mb: 0,
            memory_scope: MemoryScope::PerNode,
            pn_min_cpus: 1,
            time_limit: std::time::Duration::from_secs(1),
            contiguous: false,
            features: None,
            gres: Vec::new(),
            nodelist: Vec::new(),
            excluded_nodelist: Vec::new(),
            required_nodelist: Vec::new(),
            ntasks_per_node: None,
            distribution: TaskDistribution::Block,
            shared: false,
        };
        let mut j = Job::new(1, 0, "batch".to_string(), "a".to_string(), 1, 1, req);
        j.state = JobState::Running;
        j
    }

    #[test]
    fn cancel_marks_preempted_and_clears_allocation() {
        let mut j = job();
        apply_preemption(&mut j, PreemptMode::Cancel, 500);
        assert_eq!(j.state, JobState::Preempted);
        assert!(j.allocation.is_none());
    }

    #[test]
    fn requeue_returns_to_pending() {
        let mut j = job();
        apply_preemption(&mut j, PreemptMode::Requeue, 500);
        assert_eq!(j.state, JobState::Pending);
    }

    #[test]
    fn suspend_keeps_job_alive() {
        let mut j = job();
        apply_preemption(&mut j, PreemptMode::Suspend, 500);
        assert_eq!(j.state, JobState::Suspended);
        assert_eq!(j.suspend_time, Some(500));
    }
}
