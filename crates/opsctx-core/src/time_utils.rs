use chrono::{DateTime, Duration, Utc};

/// Source of "now" for window filtering and snapshot stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, for deterministic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns `now - days` for the given clock.
pub fn window_start(clock: &dyn Clock, days: i64) -> DateTime<Utc> {
    clock.now() - Duration::days(days)
}

/// Returns true when `created_at` falls strictly after `start`.
pub fn is_within_window(created_at: DateTime<Utc>, start: DateTime<Utc>) -> bool {
    created_at > start
}
