use serde::Serialize;
use vigil_core::CheckEvent;

/// Observed timing since the last interval reset. All durations in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalStats {
    pub avg_interval: u64,
    pub min_interval: u64,
    pub max_interval: u64,
    pub expected_interval: u64,
    /// Mean absolute difference from `expected_interval`.
    pub avg_drift: u64,
    /// 0–100.
    pub consistency: u8,
    /// Number of intervals measured.
    pub sample_size: usize,
}

/// Interval statistics over `events` (newest first) at or after `since_reset` (ms).
///
/// Needs at least two qualifying events and one positive delta between
/// neighbours. Non-positive deltas come from overlapping lineages or late
/// appends and are dropped rather than counted as zero.
pub fn stats(events: &[CheckEvent], expected_secs: u64, since_reset: i64) -> Option<IntervalStats> {
    if expected_secs == 0 {
        return None;
    }
    let kept: Vec<i64> = events
        .iter()
        .filter(|e| e.timestamp >= since_reset)
        .map(|e| e.timestamp)
        .collect();
    if kept.len() < 2 {
        return None;
    }

    let intervals: Vec<f64> = kept
        .windows(2)
        .map(|pair| pair[0] - pair[1])
        .filter(|delta| *delta > 0)
        .map(|delta| delta as f64 / 1000.0)
        .collect();
    if intervals.is_empty() {
        return None;
    }

    let n = intervals.len() as f64;
    let expected = expected_secs as f64;
    let avg = intervals.iter().sum::<f64>() / n;
    let min = intervals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = intervals.iter().copied().fold(0.0, f64::max);
    let avg_drift = (intervals.iter().map(|i| (i - expected).abs()).sum::<f64>() / n).round();
    let consistency = (100.0 - avg_drift / expected * 100.0).clamp(0.0, 100.0).round();

    Some(IntervalStats {
        avg_interval: avg.round() as u64,
        min_interval: min.round() as u64,
        max_interval: max.round() as u64,
        expected_interval: expected_secs,
        avg_drift: avg_drift as u64,
        consistency: consistency as u8,
        sample_size: intervals.len(),
    })
}
