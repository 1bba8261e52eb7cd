use crate::domain::model::Query;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

pub const DEFAULT_COOLDOWN_SECS: i64 = 60;

/// Per-query cooldown gate.
///
/// `should_notify` never mutates; `mark_notified` is called only after an
/// alert was actually dispatched.
#[derive(Debug, Clone, Copy)]
pub struct NotificationThrottle {
    cooldown: ChronoDuration,
}

impl NotificationThrottle {
    /// Negative values are treated as 0 (no cooldown).
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: ChronoDuration::seconds(cooldown_secs.max(0)),
        }
    }

    /// Elapsed time is truncated to whole seconds. A clock that moved backwards
    /// counts as still inside the window: after a step back of `d`, alerts for a
    /// query stay suppressed until `d` plus the cooldown has passed. The stamp of a
    /// skipped query is never rewritten, so the window is not rebased on the step.
    pub fn should_notify(&self, query: &Query, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(query.last_notified_at).num_seconds();
        elapsed >= self.cooldown.num_seconds()
    }

    pub fn mark_notified(&self, query: &mut Query, now: DateTime<Utc>) {
        query.last_notified_at = now;
    }
}

impl Default for NotificationThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_SECS)
    }
}
