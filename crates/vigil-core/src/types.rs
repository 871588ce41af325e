use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The subsystem credited with causing a check event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    /// The self-continuing cycle chain.
    SelfTrigger,
    /// An external CI-based scheduler (GitHub-style cron workflow).
    CiScheduler,
    /// The in-process recurring-job runner.
    LocalJob,
    /// An operator pressing "check now".
    Manual,
}

impl EventSource {
    pub const ALL: [EventSource; 4] = [
        EventSource::SelfTrigger,
        EventSource::CiScheduler,
        EventSource::LocalJob,
        EventSource::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::SelfTrigger => "self-trigger",
            EventSource::CiScheduler => "ci-scheduler",
            EventSource::LocalJob => "local-job",
            EventSource::Manual => "manual",
        }
    }

    /// Whether an invocation credited to this source owns a continuation chain.
    pub fn starts_chain(&self) -> bool {
        matches!(self, EventSource::SelfTrigger | EventSource::Manual)
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "self-trigger" => Ok(EventSource::SelfTrigger),
            "ci-scheduler" => Ok(EventSource::CiScheduler),
            "local-job" => Ok(EventSource::LocalJob),
            "manual" => Ok(EventSource::Manual),
            other => Err(format!("unknown event source: {other}")),
        }
    }
}

/// Why a cycle invocation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    /// Bootstrap or operator start: runs immediately.
    Initial,
    /// Normal self-continuation at the configured interval.
    Continuation,
    /// Second safety net after a failed continuation dispatch.
    Backup,
    /// Scheduled after a failed check, or by the watchdog.
    Recovery,
}

impl CycleKind {
    /// Every kind except `Initial` waits out its carried delay before checking.
    pub fn sleeps_first(&self) -> bool {
        !matches!(self, CycleKind::Initial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleKind::Initial => "initial",
            CycleKind::Continuation => "continuation",
            CycleKind::Backup => "backup",
            CycleKind::Recovery => "recovery",
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CycleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "initial" => Ok(CycleKind::Initial),
            "continuation" => Ok(CycleKind::Continuation),
            "backup" => Ok(CycleKind::Backup),
            "recovery" => Ok(CycleKind::Recovery),
            other => Err(format!("unknown cycle kind: {other}")),
        }
    }
}

/// The state threaded through one self-continuation chain.
///
/// Nothing about a running chain is persisted: each invocation receives its
/// lineage by value (query string or channel message) and hands a successor
/// to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleLineage {
    /// Stable for the whole chain.
    pub lineage_id: String,
    /// Fresh for every invocation.
    pub cycle_id: String,
    pub kind: CycleKind,
    /// How long this invocation waits before checking.
    pub delay_ms: u64,
    /// Lineage start (ms since epoch); compared against the cancellation marker.
    pub started_at: i64,
}

impl CycleLineage {
    /// A brand-new chain starting at `started_at`.
    pub fn initial(started_at: i64) -> Self {
        Self::fresh(CycleKind::Initial, 0, started_at)
    }

    /// A brand-new chain whose first invocation is of `kind` after `delay_ms`.
    pub fn fresh(kind: CycleKind, delay_ms: u64, started_at: i64) -> Self {
        let lineage_id = Uuid::now_v7().to_string();
        Self {
            cycle_id: lineage_id.clone(),
            lineage_id,
            kind,
            delay_ms,
            started_at,
        }
    }

    /// The successor invocation in the same chain, with a fresh cycle id.
    pub fn next(&self, kind: CycleKind, delay_ms: u64) -> Self {
        Self {
            lineage_id: self.lineage_id.clone(),
            cycle_id: Uuid::now_v7().to_string(),
            kind,
            delay_ms,
            started_at: self.started_at,
        }
    }
}

/// One completed check round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEvent {
    /// Completion time, ms since epoch.
    pub timestamp: i64,
    pub source: EventSource,
    pub cycle_id: String,
    pub lineage_id: String,
    /// Scheduling interval in effect when the event was produced.
    pub interval_seconds: u64,
    pub services_checked: u32,
}

/// A cron-like expression with an on/off switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    pub expression: String,
    #[serde(default)]
    pub enabled: bool,
}

impl CronSchedule {
    pub fn disabled(expression: &str) -> Self {
        Self {
            expression: expression.to_string(),
            enabled: false,
        }
    }
}

/// Process-wide scheduling configuration, owned by the operator.
///
/// Always re-read before computing a continuation delay; never cached across
/// a sleep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    #[serde(default = "default_refresh_interval_ms", alias = "refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_ci_schedule", alias = "ci_schedule")]
    pub ci_schedule: CronSchedule,
    #[serde(default = "default_local_job_schedule", alias = "local_job_schedule")]
    pub local_job_schedule: CronSchedule,
}

impl SchedulerConfig {
    pub fn interval_seconds(&self) -> u64 {
        self.refresh_interval_ms / 1000
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            ci_schedule: default_ci_schedule(),
            local_job_schedule: default_local_job_schedule(),
        }
    }
}

fn default_refresh_interval_ms() -> u64 {
    crate::config::FALLBACK_INTERVAL_MS
}
fn default_ci_schedule() -> CronSchedule {
    CronSchedule::disabled("*/5 * * * *")
}
fn default_local_job_schedule() -> CronSchedule {
    CronSchedule::disabled("*/5 * * * *")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_keeps_lineage_and_renews_cycle_id() {
        let first = CycleLineage::initial(1_000);
        let next = first.next(CycleKind::Continuation, 60_000);
        assert_eq!(next.lineage_id, first.lineage_id);
        assert_eq!(next.started_at, 1_000);
        assert_ne!(next.cycle_id, first.cycle_id);
        assert_eq!(next.kind, CycleKind::Continuation);
    }

    #[test]
    fn only_initial_runs_without_sleeping() {
        assert!(!CycleKind::Initial.sleeps_first());
        assert!(CycleKind::Continuation.sleeps_first());
        assert!(CycleKind::Backup.sleeps_first());
        assert!(CycleKind::Recovery.sleeps_first());
    }

    #[test]
    fn event_source_wire_names() {
        for source in EventSource::ALL {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
            assert_eq!(source.as_str().parse::<EventSource>().unwrap(), source);
        }
    }

    #[test]
    fn scheduler_config_accepts_both_key_styles() {
        let camel: SchedulerConfig =
            serde_json::from_str(r#"{"refreshIntervalMs":30000}"#).unwrap();
        let snake: SchedulerConfig =
            serde_json::from_str(r#"{"refresh_interval_ms":30000}"#).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.interval_seconds(), 30);
        assert!(!camel.ci_schedule.enabled);
    }
}
