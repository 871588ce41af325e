use serde::{Deserialize, Serialize};

/// Whether the runner is currently firing a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Fires every time its `next_run` arrives.
    Running,
    /// Kept for reference; never fires.
    Stopped,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "stopped" => Ok(JobStatus::Stopped),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted recurring check job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalJob {
    /// UUID v4 string, primary key.
    pub id: String,
    /// Unique human-readable label.
    pub name: String,
    /// Cron-like expression (`* * * * *` or `*/n * * * *`).
    pub expression: String,
    pub status: JobStatus,
    /// ISO-8601 timestamp of the most recent fire, if any.
    pub last_run: Option<String>,
    /// ISO-8601 timestamp of the next planned fire; `None` while stopped.
    pub next_run: Option<String>,
    /// Total number of fires.
    pub run_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl LocalJob {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// Interval implied by the job's expression.
    pub fn interval_secs(&self) -> u64 {
        crate::schedule::interval_secs(&self.expression)
    }
}
