// src/core/agents/rollup_trigger.rs

use crate::core::accounting::rollup::month_bounds;
use crate::core::accounting::{compute_hourly_rollup, rollup_daily, rollup_monthly, AccountingStore, HourlyRollup, NodeEvent, ReservationRecord};
use crate::core::state::ControllerState;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

/// Drives the hourly/daily/monthly accounting rollup cadence (§4.8, §4.9).
/// Each hourly tick folds the live job table plus the node-event and
/// reservation history kept on `ControllerState` into one row, commits it,
/// and buffers it; crossing a day or month boundary folds the buffered rows
/// up a level.
pub struct RollupAgent {
    state: Arc<ControllerState>,
    store: Arc<dyn AccountingStore>,
    cluster_name: String,
    hourly_buffer: Mutex<Vec<HourlyRollup>>,
    daily_buffer: Mutex<Vec<HourlyRollup>>,
    forwarded_node_events: Mutex<HashSet<usize>>,
    forwarded_reservations: Mutex<HashSet<u64>>,
}

impl RollupAgent {
    pub fn new(state: Arc<ControllerState>, store: Arc<dyn AccountingStore>, cluster_name: String) -> Self {
        Self {
            state,
            store,
            cluster_name,
            hourly_buffer: Mutex::new(Vec::new()),
            daily_buffer: Mutex::new(Vec::new()),
            forwarded_node_events: Mutex::new(HashSet::new()),
            forwarded_reservations: Mutex::new(HashSet::new()),
        }
    }

    /// Pushes node-down/up intervals that have closed since the last pass,
    /// and any reservation not yet seen, into the accounting store. Run
    /// before folding so the hourly row and the forwarded history agree.
    async fn forward_history(&self) -> Result<(), crate::core::errors::ClusterError> {
        let events = self.state.node_events.read().await;
        let mut forwarded = self.forwarded_node_events.lock().await;
        for (i, ev) in events.iter().enumerate() {
            if ev.end.is_some() && !forwarded.contains(&i) {
                self.store
                    .add_node_event(
                        &self.cluster_name,
                        NodeEvent { start: ev.start, end: ev.end.unwrap(), maint: ev.maint, cpu_count: ev.cpu_count },
                    )
                    .await?;
                forwarded.insert(i);
            }
        }
        drop(events);
        drop(forwarded);

        let reservations = self.state.reservations.read().await;
        let mut forwarded_resv = self.forwarded_reservations.lock().await;
        for resv in reservations.values() {
            if !forwarded_resv.contains(&resv.id) {
                self.store
                    .add_reservation(
                        &self.cluster_name,
                        ReservationRecord {
                            id: resv.id,
                            start: resv.time_start,
                            end: resv.time_end,
                            maint: resv.is_maint(),
                            cpu_count: resv.cpu_count,
                            // Accounts/users aren't resolved to association ids
                            // anywhere in the live state, so unused reserved
                            // time is folded into the total reserved bucket
                            // rather than apportioned per association.
                            associations: Vec::new(),
                        },
                    )
                    .await?;
                forwarded_resv.insert(resv.id);
            }
        }
        Ok(())
    }

    pub async fn rollup_hour(&self, hour_start: i64) -> Result<(), crate::core::errors::ClusterError> {
        let hour_end = hour_start + 3600;
        self.forward_history().await?;

        let jobs = self.state.jobs.read().await;
        let nodes = self.state.nodes.read().await;
        let cpu_count: u32 = nodes.nodes.iter().map(|n| n.cpus).sum();

        let records: Vec<crate::core::accounting::JobRecord> = jobs
            .jobs
            .values()
            .map(|j| crate::core::accounting::JobRecord {
                association: j.association_id,
                wckey: j.wckey_id,
                reservation_id: j.reservation_id,
                eligible_time: j.eligible_time,
                start: j.start_time,
                end: j.end_time,
                alloc_cpus: j.allocation.as_ref().map(|a| a.total_cpus()).unwrap_or(0),
                suspend_intervals: j.suspend_time.map(|s| vec![(s, j.end_time.unwrap_or(hour_end))]).unwrap_or_default(),
            })
            .collect();
        drop(jobs);
        drop(nodes);

        let node_events: Vec<NodeEvent> = self
            .state
            .node_events
            .read()
            .await
            .iter()
            .map(|ev| NodeEvent { start: ev.start, end: ev.end.unwrap_or(hour_end), maint: ev.maint, cpu_count: ev.cpu_count })
            .collect();

        let reservations: Vec<ReservationRecord> = self
            .state
            .reservations
            .read()
            .await
            .values()
            .map(|r| ReservationRecord {
                id: r.id,
                start: r.time_start,
                end: r.time_end,
                maint: r.is_maint(),
                cpu_count: r.cpu_count,
                associations: Vec::new(),
            })
            .collect();

        let row = compute_hourly_rollup(hour_start, cpu_count, &node_events, &reservations, &records);
        self.store.run_hourly_rollup(&self.cluster_name, row.clone()).await?;

        let mut hourly_buffer = self.hourly_buffer.lock().await;
        hourly_buffer.push(row);

        // Last hour of the day: fold the buffered hours into a daily row.
        if (hour_start + 3600) % 86400 == 0 {
            let day_start = hour_start + 3600 - 86400;
            let daily_row = rollup_daily(day_start, &hourly_buffer);
            hourly_buffer.clear();
            drop(hourly_buffer);
            self.store.run_daily_rollup(&self.cluster_name, daily_row.clone()).await?;

            let mut daily_buffer = self.daily_buffer.lock().await;
            daily_buffer.push(daily_row);

            let (month_start, month_secs) = month_bounds(day_start);
            if day_start + 86400 == month_start + month_secs {
                let monthly_row = rollup_monthly(month_start, month_secs, &daily_buffer);
                daily_buffer.clear();
                drop(daily_buffer);
                self.store.run_monthly_rollup(&self.cluster_name, monthly_row).await?;
            }
        }

        Ok(())
    }

    pub async fn run(self, interval: std::time::Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = crate::core::clock::now_unix();
                    let hour_start = now - (now % 3600);
                    if let Err(e) = self.rollup_hour(hour_start).await {
                        error!(error = %e, "hourly rollup failed");
                    } else {
                        info!(hour_start, "hourly rollup committed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("rollup agent shutting down");
                    return;
                }
            }
        }
    }
}
