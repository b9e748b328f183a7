// src/core/clock.rs

//! Thin wrapper around the wall clock so every component reads "now"
//! through one function instead of calling `SystemTime::now()` ad hoc.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
