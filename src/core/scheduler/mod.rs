// src/core/scheduler/mod.rs

pub mod driver;
pub mod preempt;
pub mod priority;

pub use driver::{CycleBudget, SchedulerDriver};
pub use preempt::apply_preemption;
pub use priority::{DefaultPriority, PriorityFn, PriorityWeights};
