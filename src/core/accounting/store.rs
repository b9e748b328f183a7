// src/core/accounting/store.rs

use super::rollup::{HourlyRollup, JobRecord, NodeEvent, ReservationRecord};
use crate::core::errors::ClusterError;
use crate::core::model::step::StepId;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// The accounting storage backend is out of scope (§1) beyond the
/// operations the core invokes against it; this trait is that seam. A SQL
/// implementation lives outside this crate.
///
/// Mirrors the slurmdbd RPC surface (§6.5): job lifecycle and step events
/// are pushed as they happen, node-down/up and reservation events are
/// pushed once known, and the three rollup levels are committed on their
/// own cadence.
#[async_trait]
pub trait AccountingStore: Send + Sync {
    /// Records a job's start: the job enters RUNNING and gets its own
    /// accounting row, keyed by `job_id`.
    async fn add_job_start(&self, cluster: &str, job_id: u64, record: JobRecord) -> Result<(), ClusterError>;

    /// Toggles a suspend/resume boundary at `at`. The first call after a
    /// job starts (or resumes) opens a suspend interval; the next call
    /// closes it. Mirrors slurmdbd's single `dbd_job_suspend` RPC used for
    /// both directions.
    async fn add_job_suspend(&self, cluster: &str, job_id: u64, at: i64) -> Result<(), ClusterError>;

    /// Closes a job's accounting row at `end`, closing any still-open
    /// suspend interval first.
    async fn add_job_end(&self, cluster: &str, job_id: u64, end: i64) -> Result<(), ClusterError>;

    async fn add_step_start(&self, cluster: &str, job_id: u64, step_id: StepId, start: i64) -> Result<(), ClusterError>;

    async fn add_step_complete(&self, cluster: &str, job_id: u64, step_id: StepId, end: i64, exit_code: i32) -> Result<(), ClusterError>;

    /// Records a completed node down/up (or planned-maintenance) interval.
    async fn add_node_event(&self, cluster: &str, event: NodeEvent) -> Result<(), ClusterError>;

    async fn add_reservation(&self, cluster: &str, reservation: ReservationRecord) -> Result<(), ClusterError>;

    async fn run_hourly_rollup(&self, cluster: &str, row: HourlyRollup) -> Result<(), ClusterError>;
    async fn run_daily_rollup(&self, cluster: &str, row: HourlyRollup) -> Result<(), ClusterError>;
    async fn run_monthly_rollup(&self, cluster: &str, row: HourlyRollup) -> Result<(), ClusterError>;
}

struct JobAccountingEntry {
    record: JobRecord,
    open_suspend_start: Option<i64>,
}

struct StepAccountingEntry {
    #[allow(dead_code)]
    start: i64,
    end: Option<i64>,
    exit_code: Option<i32>,
}

/// In-memory store used for tests and standalone deployments without an
/// external accounting database. Buffers rows by period start so repeated
/// rollup commits over the same window overwrite rather than duplicate
/// (§4.9: rollups are idempotent).
#[derive(Default)]
pub struct InMemoryAccountingStore {
    jobs: Mutex<HashMap<(String, u64), JobAccountingEntry>>,
    steps: Mutex<HashMap<(String, u64, StepId), StepAccountingEntry>>,
    node_events: Mutex<Vec<(String, NodeEvent)>>,
    reservations: Mutex<HashMap<(String, u64), ReservationRecord>>,
    hourly: Mutex<BTreeMap<(String, i64), HourlyRollup>>,
    daily: Mutex<BTreeMap<(String, i64), HourlyRollup>>,
    monthly: Mutex<BTreeMap<(String, i64), HourlyRollup>>,
}

impl InMemoryAccountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hourly_count(&self) -> usize {
        self.hourly.lock().unwrap().len()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn node_event_count(&self) -> usize {
        self.node_events.lock().unwrap().len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountingStore for InMemoryAccountingStore {
    async fn add_job_start(&self, cluster: &str, job_id: u64, record: JobRecord) -> Result<(), ClusterError> {
        self.jobs
            .lock()
            .unwrap()
            .insert((cluster.to_string(), job_id), JobAccountingEntry { record, open_suspend_start: None });
        Ok(())
    }

    async fn add_job_suspend(&self, cluster: &str, job_id: u64, at: i64) -> Result<(), ClusterError> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs
            .get_mut(&(cluster.to_string(), job_id))
            .ok_or_else(|| ClusterError::NotFound(format!("no accounting row for job {job_id}")))?;
        match entry.open_suspend_start.take() {
            Some(start) => entry.record.suspend_intervals.push((start, at)),
            None => entry.open_suspend_start = Some(at),
        }
        Ok(())
    }

    async fn add_job_end(&self, cluster: &str, job_id: u64, end: i64) -> Result<(), ClusterError> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs
            .get_mut(&(cluster.to_string(), job_id))
            .ok_or_else(|| ClusterError::NotFound(format!("no accounting row for job {job_id}")))?;
        if let Some(start) = entry.open_suspend_start.take() {
            entry.record.suspend_intervals.push((start, end));
        }
        entry.record.end = Some(end);
        Ok(())
    }

    async fn add_step_start(&self, cluster: &str, job_id: u64, step_id: StepId, start: i64) -> Result<(), ClusterError> {
        self.steps
            .lock()
            .unwrap()
            .insert((cluster.to_string(), job_id, step_id), StepAccountingEntry { start, end: None, exit_code: None });
        Ok(())
    }

    async fn add_step_complete(&self, cluster: &str, job_id: u64, step_id: StepId, end: i64, exit_code: i32) -> Result<(), ClusterError> {
        let mut steps = self.steps.lock().unwrap();
        let entry = steps
            .get_mut(&(cluster.to_string(), job_id, step_id))
            .ok_or_else(|| ClusterError::NotFound(format!("no accounting row for job {job_id} step {step_id:?}")))?;
        entry.end = Some(end);
        entry.exit_code = Some(exit_code);
        Ok(())
    }

    async fn add_node_event(&self, cluster: &str, event: NodeEvent) -> Result<(), ClusterError> {
        self.node_events.lock().unwrap().push((cluster.to_string(), event));
        Ok(())
    }

    async fn add_reservation(&self, cluster: &str, reservation: ReservationRecord) -> Result<(), ClusterError> {
        self.reservations.lock().unwrap().insert((cluster.to_string(), reservation.id), reservation);
        Ok(())
    }

    async fn run_hourly_rollup(&self, cluster: &str, row: HourlyRollup) -> Result<(), ClusterError> {
        self.hourly.lock().unwrap().insert((cluster.to_string(), row.period_start), row);
        Ok(())
    }

    async fn run_daily_rollup(&self, cluster: &str, row: HourlyRollup) -> Result<(), ClusterError> {
        self.daily.lock().unwrap().insert((cluster.to_string(), row.period_start), row);
        Ok(())
    }

    async fn run_monthly_rollup(&self, cluster: &str, row: HourlyRollup) -> Result<(), ClusterError> {
        self.monthly.lock().unwrap().insert((cluster.to_string(), row.period_start), row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accounting::rollup::compute_hourly_rollup;

    #[tokio::test]
    async fn repeated_rollup_over_same_window_overwrites() {
        let store = InMemoryAccountingStore::new();
        let row1 = compute_hourly_rollup(0, 4, &[], &[], &[]);
        let row2 = compute_hourly_rollup(0, 4, &[], &[], &[]);
        store.run_hourly_rollup("c1", row1).await.unwrap();
        store.run_hourly_rollup("c1", row2).await.unwrap();
        assert_eq!(store.hourly_count(), 1);
    }

    #[tokio::test]
    async fn job_suspend_toggles_open_interval_then_closes_on_end() {
        let store = InMemoryAccountingStore::new();
        let record = JobRecord {
            association: Some(1),
            wckey: None,
            reservation_id: None,
            eligible_time: 0,
            start: Some(100),
            end: None,
            alloc_cpus: 4,
            suspend_intervals: vec![],
        };
        store.add_job_start("c1", 7, record).await.unwrap();
        store.add_job_suspend("c1", 7, 200).await.unwrap();
        store.add_job_suspend("c1", 7, 260).await.unwrap();
        store.add_job_end("c1", 7, 400).await.unwrap();

        let jobs = store.jobs.lock().unwrap();
        let entry = &jobs[&("c1".to_string(), 7)];
        assert_eq!(entry.record.suspend_intervals, vec![(200, 260)]);
        assert_eq!(entry.record.end, Some(400));
        assert!(entry.open_suspend_start.is_none());
    }

    #[tokio::test]
    async fn job_end_closes_a_still_open_suspend() {
        let store = InMemoryAccountingStore::new();
        let record = JobRecord {
            association: None,
            wckey: None,
            reservation_id: None,
            eligible_time: 0,
            start: Some(0),
            end: None,
            alloc_cpus: 1,
            suspend_intervals: vec![],
        };
        store.add_job_start("c1", 1, record).await.unwrap();
        store.add_job_suspend("c1", 1, 50).await.unwrap();
        store.add_job_end("c1", 1, 90).await.unwrap();

        let jobs = store.jobs.lock().unwrap();
        assert_eq!(jobs[&("c1".to_string(), 1)].record.suspend_intervals, vec![(50, 90)]);
    }
}
