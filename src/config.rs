// src/config.rs

//! Controller configuration, loaded from a TOML file on disk. Every optional
//! field carries an explicit `default_*` function rather than an inline
//! literal, so the defaults are named and documentable in one place.

use crate::core::errors::ClusterError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How strictly node-advertised hardware specs are trusted against the
/// configured `NodeConfig` at registration time (spec §6.4, §3.8 I8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FastSchedule {
    /// Mode 0: trust whatever the node agent advertises.
    Trust,
    /// Mode 1: trust the configured values; advertised specs below the
    /// configured floor trigger a DRAIN.
    ConfigOnly,
    /// Mode 2: always use configured values, never advertised ones.
    ConfigAlways,
}

impl<'de> Deserialize<'de> for FastSchedule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let n = u8::deserialize(deserializer)?;
        match n {
            0 => Ok(FastSchedule::Trust),
            1 => Ok(FastSchedule::ConfigOnly),
            2 => Ok(FastSchedule::ConfigAlways),
            other => Err(serde::de::Error::custom(format!(
                "fast_schedule must be 0, 1, or 2, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SelectType {
    ConsRes,
    Serial,
    Topology3d,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PreemptMode {
    Off,
    Requeue,
    Cancel,
    Suspend,
    Gang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SharingPolicy {
    Exclusive,
    Shared,
    Force,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    #[serde(default = "default_state_save_location")]
    pub state_save_location: String,

    #[serde(default = "default_slurmctld_port")]
    pub slurmctld_port: u16,

    #[serde(default = "default_slurmd_port")]
    pub slurmd_port: u16,

    #[serde(default = "default_control_machine")]
    pub control_machine: String,

    #[serde(default)]
    pub backup_machine: Option<String>,

    #[serde(default = "default_node_record_prefix")]
    pub node_record_prefix: String,

    #[serde(default = "default_fast_schedule")]
    pub fast_schedule: FastSchedule,

    #[serde(default = "default_select_type")]
    pub select_type: SelectType,

    #[serde(default)]
    pub select_type_parameters: Vec<String>,

    /// Fixed torus/mesh dimensions, only consulted when `select_type` is
    /// `topology3d`.
    #[serde(default = "default_topology_dims")]
    pub topology_dims: (u32, u32, u32),

    #[serde(default = "default_sharing_default")]
    pub sharing_default: SharingPolicy,

    #[serde(default = "default_preempt_mode")]
    pub preempt_mode: PreemptMode,

    #[serde(default = "default_track_wckey")]
    pub track_wckey: bool,

    #[serde(default = "default_min_job_age", with = "humantime_serde")]
    pub min_job_age: std::time::Duration,

    #[serde(default = "default_message_timeout", with = "humantime_serde")]
    pub message_timeout: std::time::Duration,

    #[serde(default = "default_max_job_count")]
    pub max_job_count: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_metrics_bind")]
    pub metrics_bind: String,

    #[serde(default)]
    pub agents: AgentIntervals,
}

/// Periodic-task intervals (spec §5), all independently configurable the way
/// the teacher configures its own background task cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIntervals {
    #[serde(default = "default_node_poll_interval", with = "humantime_serde")]
    pub node_poll: std::time::Duration,

    #[serde(default = "default_switch_poll_interval", with = "humantime_serde")]
    pub switch_poll: std::time::Duration,

    #[serde(default = "default_backfill_interval", with = "humantime_serde")]
    pub backfill: std::time::Duration,

    #[serde(default = "default_time_limit_interval", with = "humantime_serde")]
    pub time_limit: std::time::Duration,

    #[serde(default = "default_checkpoint_interval", with = "humantime_serde")]
    pub checkpoint: std::time::Duration,

    #[serde(default = "default_rollup_interval", with = "humantime_serde")]
    pub rollup: std::time::Duration,

    #[serde(default = "default_node_response_timeout", with = "humantime_serde")]
    pub node_response_timeout: std::time::Duration,
}

impl Default for AgentIntervals {
    fn default() -> Self {
        Self {
            node_poll: default_node_poll_interval(),
            switch_poll: default_switch_poll_interval(),
            backfill: default_backfill_interval(),
            time_limit: default_time_limit_interval(),
            checkpoint: default_checkpoint_interval(),
            rollup: default_rollup_interval(),
            node_response_timeout: default_node_response_timeout(),
        }
    }
}

fn default_cluster_name() -> String {
    "cluster".to_string()
}
fn default_state_save_location() -> String {
    "/var/spool/clusterd".to_string()
}
fn default_slurmctld_port() -> u16 {
    6817
}
fn default_slurmd_port() -> u16 {
    6818
}
fn default_control_machine() -> String {
    "localhost".to_string()
}
fn default_node_record_prefix() -> String {
    "node".to_string()
}
fn default_fast_schedule() -> FastSchedule {
    FastSchedule::Trust
}
fn default_select_type() -> SelectType {
    SelectType::ConsRes
}
fn default_sharing_default() -> SharingPolicy {
    SharingPolicy::Exclusive
}
fn default_topology_dims() -> (u32, u32, u32) {
    (8, 8, 8)
}
fn default_preempt_mode() -> PreemptMode {
    PreemptMode::Off
}
fn default_track_wckey() -> bool {
    false
}
fn default_min_job_age() -> std::time::Duration {
    std::time::Duration::from_secs(300)
}
fn default_message_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(10)
}
fn default_max_job_count() -> usize {
    1_000_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_bind() -> String {
    "127.0.0.1:9100".to_string()
}
fn default_node_poll_interval() -> std::time::Duration {
    std::time::Duration::from_secs(30)
}
fn default_switch_poll_interval() -> std::time::Duration {
    std::time::Duration::from_secs(30)
}
fn default_backfill_interval() -> std::time::Duration {
    std::time::Duration::from_secs(30)
}
fn default_time_limit_interval() -> std::time::Duration {
    std::time::Duration::from_secs(60)
}
fn default_checkpoint_interval() -> std::time::Duration {
    std::time::Duration::from_secs(300)
}
fn default_rollup_interval() -> std::time::Duration {
    std::time::Duration::from_secs(3600)
}
fn default_node_response_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(120)
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClusterError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ClusterError> {
        if self.slurmctld_port == self.slurmd_port {
            return Err(ClusterError::FatalConfig(format!(
                "slurmctld_port and slurmd_port must differ, both are {}",
                self.slurmctld_port
            )));
        }
        if self.max_job_count == 0 {
            return Err(ClusterError::FatalConfig(
                "max_job_count must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let cfg: Config = toml::from_str("cluster_name = \"test\"\n").unwrap();
        assert_eq!(cfg.cluster_name, "test");
        assert_eq!(cfg.slurmctld_port, 6817);
        assert_eq!(cfg.fast_schedule, FastSchedule::Trust);
        assert_eq!(cfg.preempt_mode, PreemptMode::Off);
    }

    #[test]
    fn fast_schedule_rejects_out_of_range() {
        let err = toml::from_str::<Config>("fast_schedule = 7\n");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_equal_ports() {
        let cfg: Config =
            toml::from_str("slurmctld_port = 1000\nslurmd_port = 1000\n").unwrap();
        assert!(cfg.validate().is_err());
    }
}
