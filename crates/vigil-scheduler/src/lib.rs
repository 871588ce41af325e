//! `vigil-scheduler`: the local recurring-job runner.
//!
//! # Overview
//!
//! Jobs are persisted to a SQLite `local_jobs` table. The
//! [`engine::SchedulerEngine`] polls the table every second and fires any
//! `running` job whose `next_run` has arrived, forwarding it over an mpsc
//! channel so the gateway can run a check credited to the `local-job` source.
//!
//! # Expressions
//!
//! | Expression     | Interval           |
//! |----------------|--------------------|
//! | `* * * * *`    | 60 s               |
//! | `*/n * * * *`  | n × 60 s           |
//! | anything else  | 300 s (fallback)   |

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use schedule::{ci_interval_secs, cron_interval_secs, interval_secs};
pub use types::{JobStatus, LocalJob};
