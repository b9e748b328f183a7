// src/core/accounting/rollup.rs

//! Hourly/daily/monthly usage rollup (§4.9). Rollups are pure functions of
//! their inputs: repeating one over the same window must produce identical
//! rows, so no function here consults wall-clock time or mutable state.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct NodeEvent {
    pub start: i64,
    pub end: i64,
    pub maint: bool,
    pub cpu_count: u32,
}

#[derive(Debug, Clone)]
pub struct ReservationRecord {
    pub id: u64,
    pub start: i64,
    pub end: i64,
    pub maint: bool,
    pub cpu_count: u32,
    pub associations: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub association: Option<u64>,
    pub wckey: Option<u64>,
    pub reservation_id: Option<u64>,
    pub eligible_time: i64,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub alloc_cpus: u32,
    /// [start, end) windows during which the job was SUSPENDED and not
    /// accruing usage.
    pub suspend_intervals: Vec<(i64, i64)>,
}

pub type AssocKey = (Option<u64>, Option<u64>);

#[derive(Debug, Clone)]
pub struct HourlyRollup {
    pub period_start: i64,
    pub cpu_count: u32,
    pub total_time_secs: i64,
    pub alloc_cpu_secs: BTreeMap<AssocKey, i64>,
    pub down_cpu_secs: i64,
    pub planned_down_cpu_secs: i64,
    pub reserved_cpu_secs: i64,
    pub idle_cpu_secs: i64,
    pub overcommit_cpu_secs: i64,
}

fn overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> i64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0)
}

/// Subtracts suspend-interval overlap from a clipped job duration.
fn effective_duration(start: i64, end: i64, suspend_intervals: &[(i64, i64)]) -> i64 {
    let mut duration = end - start;
    for &(s, e) in suspend_intervals {
        duration -= overlap(s, e, start, end);
    }
    duration.max(0)
}

pub fn compute_hourly_rollup(
    hour_start: i64,
    cpu_count: u32,
    node_events: &[NodeEvent],
    reservations: &[ReservationRecord],
    jobs: &[JobRecord],
) -> HourlyRollup {
    let hour_end = hour_start + 3600;
    let total_time = cpu_count as i64 * 3600;

    let mut down = 0i64;
    let mut planned_down = 0i64;
    for ev in node_events {
        let clip = overlap(ev.start, ev.end, hour_start, hour_end);
        if ev.maint {
            planned_down += clip;
        } else {
            down += clip;
        }
    }
    down = down.min(total_time);

    let mut alloc: BTreeMap<AssocKey, i64> = BTreeMap::new();
    let mut reserved = 0i64;

    for job in jobs {
        if let (Some(start), Some(end)) = (job.start, job.end) {
            let clip_start = start.max(hour_start);
            let clip_end = end.min(hour_end);
            if clip_end > clip_start {
                let dur = effective_duration(clip_start, clip_end, &job.suspend_intervals);
                *alloc.entry((job.association, job.wckey)).or_insert(0) += dur * job.alloc_cpus as i64;
            }
        }
        // Eligible-but-not-running contributes to reserved (queued) time.
        let wait_end = job.start.unwrap_or(hour_end);
        let wait_clip = overlap(job.eligible_time, wait_end, hour_start, hour_end);
        reserved += wait_clip;
    }

    for resv in reservations {
        let clip = overlap(resv.start, resv.end, hour_start, hour_end);
        if clip == 0 {
            continue;
        }
        let resv_secs = clip * resv.cpu_count as i64;
        reserved += resv_secs;
        if resv.maint {
            planned_down += clip * resv.cpu_count as i64;
        }

        if !resv.associations.is_empty() {
            let used: i64 = jobs
                .iter()
                .filter(|j| j.reservation_id == Some(resv.id))
                .map(|j| {
                    let (Some(s), Some(e)) = (j.start, j.end) else { return 0 };
                    let cs = s.max(hour_start).max(resv.start);
                    let ce = e.min(hour_end).min(resv.end);
                    if ce > cs {
                        effective_duration(cs, ce, &j.suspend_intervals) * j.alloc_cpus as i64
                    } else {
                        0
                    }
                })
                .sum();
            let unused = (resv_secs - used).max(0);
            let share = unused / resv.associations.len() as i64;
            for assoc in &resv.associations {
                *alloc.entry((Some(*assoc), None)).or_insert(0) += share;
            }
        }
    }

    planned_down = planned_down.min(total_time.saturating_sub(down));

    let total_alloc: i64 = alloc.values().sum();
    let mut idle = total_time - total_alloc - down - planned_down - reserved;
    let overcommit = if idle < 0 { -idle } else { 0 };
    if idle < 0 {
        idle = 0;
    }

    HourlyRollup {
        period_start: hour_start,
        cpu_count,
        total_time_secs: total_time,
        alloc_cpu_secs: alloc,
        down_cpu_secs: down,
        planned_down_cpu_secs: planned_down,
        reserved_cpu_secs: reserved,
        idle_cpu_secs: idle,
        overcommit_cpu_secs: overcommit,
    }
}

/// Sums 24 hourly rows covering `[day_start, day_start + 86400)` into one
/// daily row per association/wckey.
pub fn rollup_daily(day_start: i64, hours: &[HourlyRollup]) -> HourlyRollup {
    fold_rollups(day_start, 86400, hours)
}

/// Sums the daily rows of a calendar month.
pub fn rollup_monthly(month_start: i64, month_secs: i64, days: &[HourlyRollup]) -> HourlyRollup {
    fold_rollups(month_start, month_secs, days)
}

fn fold_rollups(period_start: i64, period_secs: i64, rows: &[HourlyRollup]) -> HourlyRollup {
    let mut alloc: BTreeMap<AssocKey, i64> = BTreeMap::new();
    let mut down = 0;
    let mut planned_down = 0;
    let mut reserved = 0;
    let mut idle = 0;
    let mut overcommit = 0;
    let cpu_count = rows.last().map(|r| r.cpu_count).unwrap_or(0);

    for row in rows {
        for (k, v) in &row.alloc_cpu_secs {
            *alloc.entry(*k).or_insert(0) += v;
        }
        down += row.down_cpu_secs;
        planned_down += row.planned_down_cpu_secs;
        reserved += row.reserved_cpu_secs;
        idle += row.idle_cpu_secs;
        overcommit += row.overcommit_cpu_secs;
    }

    HourlyRollup {
        period_start,
        cpu_count,
        total_time_secs: period_secs * cpu_count as i64,
        alloc_cpu_secs: alloc,
        down_cpu_secs: down,
        planned_down_cpu_secs: planned_down,
        reserved_cpu_secs: reserved,
        idle_cpu_secs: idle,
        overcommit_cpu_secs: overcommit,
    }
}

/// Civil calendar date from a day count since the Unix epoch (Howard
/// Hinnant's `civil_from_days`, public domain). Used only to find calendar
/// month boundaries for the monthly rollup cadence, since the epoch alone
/// doesn't carry month lengths.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (if m > 2 { m - 3 } else { m + 9 }) as i64;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

/// Start and length, in seconds, of the UTC calendar month containing
/// `unix_time`.
pub fn month_bounds(unix_time: i64) -> (i64, i64) {
    let day = unix_time.div_euclid(86400);
    let (y, m, _) = civil_from_days(day);
    let start_day = days_from_civil(y, m, 1);
    let next_start_day = if m == 12 { days_from_civil(y + 1, 1, 1) } else { days_from_civil(y, m + 1, 1) };
    (start_day * 86400, (next_start_day - start_day) * 86400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_handles_february_leap_year() {
        // 2024-02-15T00:00:00Z, a leap year.
        let (start, secs) = month_bounds(1708000000);
        assert_eq!(start, days_from_civil(2024, 2, 1) * 86400);
        assert_eq!(secs, 29 * 86400);
    }

    #[test]
    fn month_bounds_handles_december_year_rollover() {
        // 2023-12-20T00:00:00Z.
        let (start, secs) = month_bounds(1703030400);
        assert_eq!(start, days_from_civil(2023, 12, 1) * 86400);
        assert_eq!(secs, 31 * 86400);
    }

    #[test]
    fn idle_fills_remainder_with_no_activity() {
        let r = compute_hourly_rollup(0, 4, &[], &[], &[]);
        assert_eq!(r.total_time_secs, 4 * 3600);
        assert_eq!(r.idle_cpu_secs, 4 * 3600);
        assert_eq!(r.overcommit_cpu_secs, 0);
    }

    #[test]
    fn down_event_reduces_idle() {
        let events = vec![NodeEvent { start: 0, end: 1800, maint: false, cpu_count: 4 }];
        let r = compute_hourly_rollup(0, 4, &events, &[], &[]);
        assert_eq!(r.down_cpu_secs, 1800);
        assert_eq!(r.idle_cpu_secs, 4 * 3600 - 1800);
    }

    #[test]
    fn job_allocation_is_clipped_to_the_hour() {
        let jobs = vec![JobRecord {
            association: Some(1),
            wckey: None,
            reservation_id: None,
            eligible_time: 0,
            start: Some(-1800),
            end: Some(1800),
            alloc_cpus: 2,
            suspend_intervals: vec![],
        }];
        let r = compute_hourly_rollup(0, 4, &[], &[], &jobs);
        // only the [0,1800) portion falls in this hour: 1800s * 2cpus
        assert_eq!(r.alloc_cpu_secs[&(Some(1), None)], 3600);
    }

    #[test]
    fn overcommit_absorbs_negative_idle() {
        let jobs = vec![JobRecord {
            association: Some(1),
            wckey: None,
            reservation_id: None,
            eligible_time: 0,
            start: Some(0),
            end: Some(3600),
            alloc_cpus: 10,
            suspend_intervals: vec![],
        }];
        // cpu_count=4 -> total_time=14400, but alloc=36000 > total_time
        let r = compute_hourly_rollup(0, 4, &[], &[], &jobs);
        assert_eq!(r.idle_cpu_secs, 0);
        assert!(r.overcommit_cpu_secs > 0);
    }

    #[test]
    fn daily_rollup_sums_hours() {
        let hours: Vec<HourlyRollup> = (0..24).map(|h| compute_hourly_rollup(h * 3600, 2, &[], &[], &[])).collect();
        let daily = rollup_daily(0, &hours);
        assert_eq!(daily.idle_cpu_secs, 24 * 2 * 3600);
    }
}
