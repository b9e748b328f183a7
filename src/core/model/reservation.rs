// src/core/model/reservation.rs

use crate::core::bitmap::NodeBitmap;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ReservationFlags: u16 {
        const MAINT        = 0b0000_0001;
        const OVERLAP       = 0b0000_0010;
        const IGNORE_JOBS   = 0b0000_0100;
        const DAILY         = 0b0000_1000;
        const WEEKLY        = 0b0001_0000;
        const STATIC_ALLOC  = 0b0010_0000;
        const ANY_NODES     = 0b0100_0000;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub name: String,
    pub id: u64,
    pub time_start: i64,
    pub time_end: i64,
    pub flags: ReservationFlags,

    #[serde(skip)]
    pub node_bitmap: NodeBitmap,
    pub cpu_count: u32,

    pub users: Vec<String>,
    pub accounts: Vec<String>,
}

impl Reservation {
    pub fn is_active(&self, now: i64) -> bool {
        now >= self.time_start && now < self.time_end
    }

    pub fn is_maint(&self) -> bool {
        self.flags.contains(ReservationFlags::MAINT)
    }
}
