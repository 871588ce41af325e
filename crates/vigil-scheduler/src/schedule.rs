use chrono::{DateTime, Duration, TimeZone, Utc};

/// Interval assumed for any expression outside the supported shapes.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
/// GitHub-style schedulers never run more often than every 5 minutes.
pub const CI_MIN_INTERVAL_SECS: u64 = 300;
/// Longest step accepted in `*/n`: once a day.
pub const MAX_STEP_MINUTES: u64 = 1_440;

/// Parse the supported cron shapes into an interval in seconds.
///
/// Only `* * * * *` (every minute) and `*/n * * * *` (every n minutes) are
/// understood, with `n` in `1..=MAX_STEP_MINUTES`; anything else returns `None`.
pub fn cron_interval_secs(expression: &str) -> Option<u64> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 || fields[1..].iter().any(|f| *f != "*") {
        return None;
    }
    match fields[0] {
        "*" => Some(60),
        minute => {
            let n: u64 = minute.strip_prefix("*/")?.parse().ok()?;
            if !(1..=MAX_STEP_MINUTES).contains(&n) {
                return None;
            }
            n.checked_mul(60)
        }
    }
}

/// Interval for `expression`, falling back to [`DEFAULT_INTERVAL_SECS`].
pub fn interval_secs(expression: &str) -> u64 {
    cron_interval_secs(expression).unwrap_or(DEFAULT_INTERVAL_SECS)
}

/// Expected interval of a CI-hosted schedule, clamped to the platform floor.
pub fn ci_interval_secs(expression: &str) -> u64 {
    interval_secs(expression).max(CI_MIN_INTERVAL_SECS)
}

/// Next fire time strictly after `from`.
///
/// Fire times are aligned to multiples of the interval since the epoch, so
/// `*/5 * * * *` fires on minutes divisible by five just as cron would.
pub fn compute_next_run(expression: &str, from: DateTime<Utc>) -> DateTime<Utc> {
    let every = i64::try_from(interval_secs(expression))
        .ok()
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_INTERVAL_SECS as i64);
    let aligned = (from.timestamp() / every)
        .checked_add(1)
        .and_then(|slots| slots.checked_mul(every))
        .and_then(|next| Utc.timestamp_opt(next, 0).single());
    aligned
        .or_else(|| Duration::try_seconds(every).and_then(|d| from.checked_add_signed(d)))
        .unwrap_or(from)
}
