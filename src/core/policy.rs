use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// What a search or scan failure does to the rest of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Alert the query's contacts, release the session, terminate.
    #[default]
    Shutdown,
    /// Back off and retry the query; degrade it after repeated failures.
    Isolate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    pub mode: FailureMode,
    pub max_consecutive_failures: u32,
    pub backoff_secs: i64,
    pub max_backoff_secs: i64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            mode: FailureMode::Shutdown,
            max_consecutive_failures: 3,
            backoff_secs: 30,
            max_backoff_secs: 600,
        }
    }
}

impl FailurePolicy {
    /// `backoff * 2^(failures-1)`, capped.
    pub fn backoff_for(&self, failures: u32) -> ChronoDuration {
        let exp = failures.saturating_sub(1).min(30);
        let secs = self
            .backoff_secs
            .max(0)
            .saturating_mul(1_i64 << exp)
            .min(self.max_backoff_secs.max(0));
        ChronoDuration::seconds(secs)
    }
}

/// Result of recording a failure under [`FailureMode::Isolate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryAt(DateTime<Utc>),
    Degraded,
}

/// Per-query failure bookkeeping; only used in isolate mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryHealth {
    consecutive_failures: u32,
    retry_at: Option<DateTime<Utc>>,
    degraded: bool,
}

impl QueryHealth {
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.degraded && self.retry_at.map_or(true, |at| now >= at)
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.retry_at = None;
    }

    pub fn record_failure(&mut self, policy: &FailurePolicy, now: DateTime<Utc>) -> FailureOutcome {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= policy.max_consecutive_failures {
            self.degraded = true;
            self.retry_at = None;
            return FailureOutcome::Degraded;
        }
        let at = now + policy.backoff_for(self.consecutive_failures);
        self.retry_at = Some(at);
        FailureOutcome::RetryAt(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = FailurePolicy {
            backoff_secs: 30,
            max_backoff_secs: 100,
            ..Default::default()
        };
        assert_eq!(policy.backoff_for(1).num_seconds(), 30);
        assert_eq!(policy.backoff_for(2).num_seconds(), 60);
        assert_eq!(policy.backoff_for(3).num_seconds(), 100);
        assert_eq!(policy.backoff_for(40).num_seconds(), 100);
    }

    #[test]
    fn test_health_degrades_after_max_failures() {
        let policy = FailurePolicy {
            mode: FailureMode::Isolate,
            max_consecutive_failures: 2,
            ..Default::default()
        };
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let mut health = QueryHealth::default();

        assert!(health.is_due(t0));
        let first = health.record_failure(&policy, t0);
        assert_eq!(first, FailureOutcome::RetryAt(t0 + ChronoDuration::seconds(30)));
        assert!(!health.is_due(t0 + ChronoDuration::seconds(29)));
        assert!(health.is_due(t0 + ChronoDuration::seconds(30)));

        assert_eq!(health.record_failure(&policy, t0), FailureOutcome::Degraded);
        assert!(health.is_degraded());
        assert!(!health.is_due(t0 + ChronoDuration::days(1)));
    }

    #[test]
    fn test_success_resets_counter() {
        let policy = FailurePolicy::default();
        let t0 = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let mut health = QueryHealth::default();

        health.record_failure(&policy, t0);
        health.record_success();
        assert_eq!(health.consecutive_failures(), 0);
        assert!(health.is_due(t0));
    }
}
