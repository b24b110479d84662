//! Clock abstraction and timestamp formatting.
//!
//! History entries store timestamps as unix milliseconds. The [`Clock`]
//! trait lets tests drive time explicitly through [`ManualClock`].

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Local, TimeZone, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// The current instant as unix milliseconds.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap();
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write().unwrap() = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

/// Format unix milliseconds as local `YYYY-MM-DD HH:MM:SS`.
///
/// Out-of-range values format as an empty string.
pub fn format_timestamp(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => String::new(),
    }
}

/// Describe how long before `now` the instant `millis` was, e.g. "5 minutes ago".
pub fn format_relative(millis: i64, now: DateTime<Utc>) -> String {
    let elapsed = now.timestamp_millis().saturating_sub(millis) / 1000;

    if elapsed < 0 {
        return "in the future".to_string();
    }

    let (amount, unit) = match elapsed {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (elapsed / 60, "minute"),
        3_600..=86_399 => (elapsed / 3_600, "hour"),
        _ => (elapsed / 86_400, "day"),
    };

    if amount == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", amount, unit)
    }
}
