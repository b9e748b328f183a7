// src/core/scheduler/priority.rs

use crate::core::model::Job;

/// Pluggable job priority function (§4.4, §8 S-priority). Anything that can
/// score a job is a valid priority function; the default combines
/// fair-share, age, QOS weight, and partition weight with configurable
/// coefficients.
pub trait PriorityFn: Send + Sync {
    fn priority(&self, job: &Job, now: i64) -> i64;
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityWeights {
    pub fairshare: f64,
    pub age: f64,
    pub qos: f64,
    pub partition: f64,
    pub max_age_secs: i64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            fairshare: 10_000.0,
            age: 1_000.0,
            qos: 1_000.0,
            partition: 1_000.0,
            max_age_secs: 7 * 24 * 3600,
        }
    }
}

pub struct DefaultPriority {
    pub weights: PriorityWeights,
}

impl Default for DefaultPriority {
    fn default() -> Self {
        Self { weights: PriorityWeights::default() }
    }
}

impl PriorityFn for DefaultPriority {
    fn priority(&self, job: &Job, now: i64) -> i64 {
        let w = &self.weights;
        let age_secs = (now - job.eligible_time).max(0);
        let age_factor = (age_secs.min(w.max_age_secs) as f64) / (w.max_age_secs.max(1) as f64);

        let qos_factor = job.qos_id.map(|q| (q as f64 / 100.0).min(1.0)).unwrap_or(0.0);

        let score = w.fairshare * job.fairshare_component
            + w.age * age_factor
            + w.qos * qos_factor
            + w.partition * 0.0
            - job.nice as f64;

        score as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::job::MemoryScope;
    use crate::core::model::{JobRequest, TaskDistribution};

    fn req() -> JobRequest {
        JobRequest {
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
        }
    }

    #[test]
    fn older_job_scores_at_least_as_high() {
        let p = DefaultPriority::default();
        let mut young = Job::new(1, 1000, "batch".to_string(), "a".to_string(), 1, 1, req());
        young.eligible_time = 1000;
        let mut old = Job::new(2, 0, "batch".to_string(), "a".to_string(), 1, 1, req());
        old.eligible_time = 0;
        assert!(p.priority(&old, 1000) >= p.priority(&young, 1000));
    }

    #[test]
    fn nice_lowers_priority() {
        let p = DefaultPriority::default();
        let mut job = Job::new(1, 0, "batch".to_string(), "a".to_string(), 1, 1, req());
        job.nice = 100;
        let baseline = Job::new(2, 0, "batch".to_string(), "a".to_string(), 1, 1, req());
        assert!(p.priority(&job, 0) < p.priority(&baseline, 0));
    }
}
