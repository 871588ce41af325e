use serde::Serialize;
use vigil_core::{CheckEvent, EventSource, SchedulerConfig};
use vigil_scheduler::LocalJob;

use crate::drift::{stats, IntervalStats};
use crate::health::{classify, Health};
use crate::reconciler::{last_event_for, ActiveSource, ReconcileInput, SourceReconciler};

/// Per-source freshness.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source: EventSource,
    pub last_event: Option<i64>,
    pub seconds_ago: Option<u64>,
    pub expected_interval_seconds: Option<u64>,
    pub health: Health,
}

/// Everything the monitoring view shows, minus in-process state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub active_source: ActiveSource,
    pub sources: Vec<SourceStatus>,
    pub interval_stats: Option<IntervalStats>,
    pub last_interval_reset: i64,
    pub generated_at: i64,
}

impl MonitorReport {
    /// `events` newest first, as read from the history store. Interval stats
    /// cover only events credited to the active source.
    pub fn build(
        reconciler: &SourceReconciler,
        events: &[CheckEvent],
        config: &SchedulerConfig,
        jobs: &[LocalJob],
        last_interval_reset: i64,
        now: i64,
    ) -> Self {
        let input = ReconcileInput { config, jobs };
        let active_source = reconciler.active_source(&input);

        let sources = EventSource::ALL
            .iter()
            .map(|&source| {
                let last = last_event_for(events, source).map(|e| e.timestamp);
                let seconds_ago = last.map(|ts| (now - ts).max(0) as u64 / 1000);
                let expected = reconciler.expected_interval(source, &input);
                let health = match expected {
                    Some(expected) => classify(seconds_ago, expected),
                    None => Health::Unknown,
                };
                SourceStatus {
                    source,
                    last_event: last,
                    seconds_ago,
                    expected_interval_seconds: expected,
                    health,
                }
            })
            .collect();

        let credited: Vec<CheckEvent> = events
            .iter()
            .filter(|e| e.source == active_source.kind)
            .cloned()
            .collect();
        let interval_stats = stats(&credited, active_source.interval_seconds, last_interval_reset);

        Self {
            active_source,
            sources,
            interval_stats,
            last_interval_reset,
            generated_at: now,
        }
    }

    pub fn source(&self, source: EventSource) -> Option<&SourceStatus> {
        self.sources.iter().find(|s| s.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(source: EventSource, timestamp: i64) -> CheckEvent {
        CheckEvent {
            timestamp,
            source,
            cycle_id: format!("c{timestamp}"),
            lineage_id: "l".to_string(),
            interval_seconds: 60,
            services_checked: 1,
        }
    }

    #[test]
    fn report_grades_each_source() {
        let now = 1_000_000;
        let events = vec![
            event(EventSource::SelfTrigger, now - 100_000),
            event(EventSource::SelfTrigger, now - 160_000),
            event(EventSource::Manual, now - 500_000),
        ];
        let config = SchedulerConfig::default();
        let report =
            MonitorReport::build(&SourceReconciler::default(), &events, &config, &[], 0, now);

        assert_eq!(report.active_source.kind, EventSource::SelfTrigger);

        let own = report.source(EventSource::SelfTrigger).unwrap();
        assert_eq!(own.seconds_ago, Some(100));
        assert_eq!(own.health, Health::Critical);

        let manual = report.source(EventSource::Manual).unwrap();
        assert_eq!(manual.health, Health::Unknown);
        assert_eq!(manual.expected_interval_seconds, None);

        let ci = report.source(EventSource::CiScheduler).unwrap();
        assert_eq!(ci.last_event, None);

        let stats = report.interval_stats.unwrap();
        // Only the two self-trigger events count.
        assert_eq!(stats.sample_size, 1);
        assert_eq!(stats.avg_interval, 60);
        assert_eq!(stats.expected_interval, 60);
    }

    #[test]
    fn serializes_camel_case() {
        let config = SchedulerConfig::default();
        let report = MonitorReport::build(&SourceReconciler::default(), &[], &config, &[], 0, 0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["activeSource"]["kind"], "self-trigger");
        assert_eq!(json["activeSource"]["color"], "green");
        assert!(json["intervalStats"].is_null());
        assert_eq!(json["sources"].as_array().unwrap().len(), 4);
    }
}
