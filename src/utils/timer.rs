//! Timer utilities
//!
//! Provides the clock injected into the engine and duration formatting helpers.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of timestamps for result records
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never goes backwards.
///
/// Anchors the wall time once and advances it with a monotonic `Instant`.
#[derive(Debug)]
pub struct SystemClock {
    wall: DateTime<Utc>,
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            wall: Utc::now(),
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed =
            chrono::Duration::from_std(self.start.elapsed()).unwrap_or(chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Clock advanced by hand, for deterministic timing
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Format a duration as a human readable time span
pub fn format_timespan(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms == 0 {
        return "0 seconds".to_string();
    }
    if total_ms < 1000 {
        return pluralize(total_ms as u64, "millisecond");
    }

    let rounded = (duration.as_secs_f64() * 100.0).round() / 100.0;
    if rounded < 60.0 {
        return if rounded == 1.0 {
            "1 second".to_string()
        } else {
            format!("{rounded} seconds")
        };
    }

    let whole = rounded as u64;
    let hours = whole / 3600;
    let minutes = (whole % 3600) / 60;
    let seconds = whole % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(pluralize(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(pluralize(minutes, "minute"));
    }
    if seconds > 0 {
        parts.push(pluralize(seconds, "second"));
    }

    match parts.len() {
        1 => parts.remove(0),
        _ => {
            let last = parts.pop().unwrap_or_default();
            format!("{} and {}", parts.join(", "), last)
        }
    }
}

fn pluralize(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
