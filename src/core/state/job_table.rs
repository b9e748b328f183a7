// src/core/state/job_table.rs

use crate::core::model::Job;
use std::collections::BTreeMap;

/// In-memory job table keyed by job id. `BTreeMap` keeps iteration in
/// job-id order, which doubles as submit order since ids are monotonic.
#[derive(Debug, Default)]
pub struct JobTable {
    pub jobs: BTreeMap<u64, Job>,
    next_job_id: u64,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_job_id: 1,
        }
    }

    /// Allocates the next job id, wrapping only when exhausted (§3.3).
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_job_id;
        self.next_job_id = self.next_job_id.checked_add(1).unwrap_or(1);
        while self.jobs.contains_key(&self.next_job_id) {
            self.next_job_id = self.next_job_id.checked_add(1).unwrap_or(1);
        }
        id
    }

    pub fn insert(&mut self, job: Job) {
        self.jobs.insert(job.job_id, job);
    }

    pub fn get(&self, job_id: u64) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn get_mut(&mut self, job_id: u64) -> Option<&mut Job> {
        self.jobs.get_mut(&job_id)
    }

    pub fn pending_in_submit_order(&self) -> impl Iterator<Item = &Job> {
        self.jobs
            .values()
            .filter(|j| j.state == crate::core::model::JobState::Pending)
    }

    /// Drops jobs terminal for longer than `min_job_age`, per the configured
    /// retention window (§3.9, §6.4 `min_job_age`).
    pub fn purge_terminal_older_than(&mut self, now: i64, min_job_age_secs: i64) -> Vec<u64> {
        let expired: Vec<u64> = self
            .jobs
            .values()
            .filter(|j| {
                j.state.is_terminal()
                    && j.end_time
                        .map(|end| now - end > min_job_age_secs)
                        .unwrap_or(false)
            })
            .map(|j| j.job_id)
            .collect();
        for id in &expired {
            self.jobs.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_is_monotonic() {
        let mut t = JobTable::new();
        assert_eq!(t.next_id(), 1);
        assert_eq!(t.next_id(), 2);
    }

    #[test]
    fn next_id_skips_occupied_slots_after_wrap() {
        let mut t = JobTable::new();
        t.next_job_id = u64::MAX;
        let wrapped = t.next_id();
        assert_eq!(wrapped, u64::MAX);
        assert_eq!(t.next_id(), 1);
    }
}
