// src/core/accounting/mod.rs

pub mod rollup;
pub mod store;

pub use rollup::{compute_hourly_rollup, rollup_daily, rollup_monthly, HourlyRollup, JobRecord, NodeEvent, ReservationRecord};
pub use store::{AccountingStore, InMemoryAccountingStore};
