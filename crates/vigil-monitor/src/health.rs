use serde::Serialize;

/// How overdue a source is relative to its expected interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl Health {
    /// Badge colour.
    pub fn color(&self) -> &'static str {
        match self {
            Health::Healthy => "green",
            Health::Warning => "yellow",
            Health::Critical => "red",
            Health::Unknown => "gray",
        }
    }
}

/// Grade `seconds_since_last` against `expected_secs`.
///
/// `None` (no event yet) and a zero expected interval are `Unknown`. At or
/// past 1.5× expected is `Critical`, past 1× is `Warning`.
pub fn classify(seconds_since_last: Option<u64>, expected_secs: u64) -> Health {
    let Some(elapsed) = seconds_since_last else {
        return Health::Unknown;
    };
    if expected_secs == 0 {
        return Health::Unknown;
    }
    if elapsed * 2 >= expected_secs * 3 {
        Health::Critical
    } else if elapsed > expected_secs {
        Health::Warning
    } else {
        Health::Healthy
    }
}

/// What the caller should do after one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Nothing to do.
    Idle,
    /// Re-invoke the controller with a recovery cycle. `attempt` is 1-based.
    Retry { attempt: u32 },
    /// Still critical, but every allowed attempt has been spent.
    Exhausted,
}

/// Bounded automatic retry after the critical threshold.
///
/// Counts consecutive critical observations that triggered a retry and
/// resets once the source comes back to `Healthy` or `Warning`.
#[derive(Debug, Clone)]
pub struct RetryEscalation {
    max_attempts: u32,
    attempts: u32,
}

impl RetryEscalation {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn observe(&mut self, health: Health) -> Escalation {
        match health {
            Health::Critical if self.attempts < self.max_attempts => {
                self.attempts += 1;
                Escalation::Retry {
                    attempt: self.attempts,
                }
            }
            Health::Critical => Escalation::Exhausted,
            Health::Healthy | Health::Warning => {
                self.attempts = 0;
                Escalation::Idle
            }
            Health::Unknown => Escalation::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds() {
        assert_eq!(classify(None, 60), Health::Unknown);
        assert_eq!(classify(Some(0), 60), Health::Healthy);
        assert_eq!(classify(Some(60), 60), Health::Healthy);
        assert_eq!(classify(Some(61), 60), Health::Warning);
        assert_eq!(classify(Some(89), 60), Health::Warning);
        assert_eq!(classify(Some(90), 60), Health::Critical);
        assert_eq!(classify(Some(10_000), 60), Health::Critical);
    }

    #[test]
    fn odd_expected_interval_uses_exact_threshold() {
        // 1.5 × 45 = 67.5
        assert_eq!(classify(Some(67), 45), Health::Warning);
        assert_eq!(classify(Some(68), 45), Health::Critical);
    }

    #[test]
    fn zero_expected_is_unknown() {
        assert_eq!(classify(Some(5), 0), Health::Unknown);
    }

    #[test]
    fn escalation_is_capped_and_resets() {
        let mut retry = RetryEscalation::new(3);
        assert_eq!(retry.observe(Health::Critical), Escalation::Retry { attempt: 1 });
        assert_eq!(retry.observe(Health::Critical), Escalation::Retry { attempt: 2 });
        assert_eq!(retry.observe(Health::Unknown), Escalation::Idle);
        assert_eq!(retry.observe(Health::Critical), Escalation::Retry { attempt: 3 });
        assert_eq!(retry.observe(Health::Critical), Escalation::Exhausted);
        assert_eq!(retry.attempts(), 3);

        assert_eq!(retry.observe(Health::Warning), Escalation::Idle);
        assert_eq!(retry.attempts(), 0);
        assert_eq!(retry.observe(Health::Critical), Escalation::Retry { attempt: 1 });
    }
}
