//! Which trigger source is authoritative right now.
//!
//! Sources are tried top-down: local-job, then ci-scheduler, then the
//! self-trigger fallback. The first strategy that applies wins.

use serde::Serialize;
use tracing::debug;
use vigil_core::{CheckEvent, EventSource, SchedulerConfig};
use vigil_scheduler::{ci_interval_secs, LocalJob};

/// Everything a strategy may look at.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub config: &'a SchedulerConfig,
    pub jobs: &'a [LocalJob],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSource {
    pub kind: EventSource,
    pub color: &'static str,
    pub interval_seconds: u64,
    /// The job name or expression that produced the interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub trait SourceStrategy: Send + Sync {
    fn source(&self) -> EventSource;

    fn color(&self) -> &'static str;

    /// Expected interval and detail, or `None` if this source is not in play.
    fn resolve(&self, input: &ReconcileInput<'_>) -> Option<(u64, Option<String>)>;
}

/// A running local job wins. Among several, the shortest interval wins,
/// ties going to the first listed.
struct LocalJobStrategy;

impl SourceStrategy for LocalJobStrategy {
    fn source(&self) -> EventSource {
        EventSource::LocalJob
    }

    fn color(&self) -> &'static str {
        "purple"
    }

    fn resolve(&self, input: &ReconcileInput<'_>) -> Option<(u64, Option<String>)> {
        let mut best: Option<&LocalJob> = None;
        for job in input.jobs.iter().filter(|j| j.is_running()) {
            if best.map_or(true, |b| job.interval_secs() < b.interval_secs()) {
                best = Some(job);
            }
        }
        best.map(|job| (job.interval_secs(), Some(job.name.clone())))
    }
}

struct CiSchedulerStrategy;

impl SourceStrategy for CiSchedulerStrategy {
    fn source(&self) -> EventSource {
        EventSource::CiScheduler
    }

    fn color(&self) -> &'static str {
        "blue"
    }

    fn resolve(&self, input: &ReconcileInput<'_>) -> Option<(u64, Option<String>)> {
        let schedule = &input.config.ci_schedule;
        schedule.enabled.then(|| {
            (
                ci_interval_secs(&schedule.expression),
                Some(schedule.expression.clone()),
            )
        })
    }
}

struct SelfTriggerStrategy;

impl SourceStrategy for SelfTriggerStrategy {
    fn source(&self) -> EventSource {
        EventSource::SelfTrigger
    }

    fn color(&self) -> &'static str {
        "green"
    }

    fn resolve(&self, input: &ReconcileInput<'_>) -> Option<(u64, Option<String>)> {
        Some((input.config.interval_seconds(), None))
    }
}

/// Ordered strategy list, highest priority first.
pub struct SourceReconciler {
    strategies: Vec<Box<dyn SourceStrategy>>,
}

impl Default for SourceReconciler {
    fn default() -> Self {
        Self::new(vec![
            Box::new(LocalJobStrategy),
            Box::new(CiSchedulerStrategy),
            Box::new(SelfTriggerStrategy),
        ])
    }
}

impl SourceReconciler {
    pub fn new(strategies: Vec<Box<dyn SourceStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn active_source(&self, input: &ReconcileInput<'_>) -> ActiveSource {
        for strategy in &self.strategies {
            if let Some((interval_seconds, detail)) = strategy.resolve(input) {
                debug!(source = %strategy.source(), interval_seconds, "active source resolved");
                return ActiveSource {
                    kind: strategy.source(),
                    color: strategy.color(),
                    interval_seconds,
                    detail,
                };
            }
        }
        // An empty or custom list can fall through; self-trigger always runs.
        ActiveSource {
            kind: EventSource::SelfTrigger,
            color: SelfTriggerStrategy.color(),
            interval_seconds: input.config.interval_seconds(),
            detail: None,
        }
    }

    /// Interval `source` would imply if it were active, or `None` if it is
    /// not in play (manual triggers never are).
    pub fn expected_interval(&self, source: EventSource, input: &ReconcileInput<'_>) -> Option<u64> {
        self.strategies
            .iter()
            .find(|s| s.source() == source)
            .and_then(|s| s.resolve(input))
            .map(|(interval, _)| interval)
    }
}

/// Newest event credited to `source`.
pub fn last_event_for(events: &[CheckEvent], source: EventSource) -> Option<&CheckEvent> {
    events
        .iter()
        .filter(|e| e.source == source)
        .max_by_key(|e| e.timestamp)
}
