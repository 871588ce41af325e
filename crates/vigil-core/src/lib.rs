//! `vigil-core`: configuration, errors and domain types shared by every
//! vigil crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Result, VigilError};
pub use types::{
    now_ms, CheckEvent, CronSchedule, CycleKind, CycleLineage, EventSource, SchedulerConfig,
};
