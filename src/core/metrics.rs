// src/core/metrics.rs

//! Prometheus metrics exposed on the metrics HTTP endpoint
//! (`server::metrics_server`).

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Registry};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("clusterd_jobs_submitted_total", "total jobs submitted").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static JOBS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("clusterd_jobs_started_total", "total jobs that transitioned to RUNNING").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static JOBS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("clusterd_jobs_failed_total", "total jobs that ended in a failure state").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static NODES_UP: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("clusterd_nodes_up", "nodes currently in the up bitmap").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static NODES_DOWN: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("clusterd_nodes_down", "nodes currently DOWN").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static PENDING_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("clusterd_pending_jobs", "jobs currently PENDING").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub fn render() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buf = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buf).ok();
    String::from_utf8(buf).unwrap_or_default()
}
