//! Time source abstraction.
//!
//! Every duration and expiry computation reads the time through a [`Clock`]
//! so tests can drive the lifecycle deterministically.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// A source of "now".
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

/// A clock that only moves when told to.
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

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Rounds a millisecond span to whole minutes, halves rounding up.
pub fn round_minutes(millis: i64) -> i64 {
    (millis as f64 / 60_000.0 + 0.5).floor() as i64
}

/// Whole minutes elapsed between `from` and `to`, rounded.
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    round_minutes((to - from).num_milliseconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_minutes() {
        assert_eq!(round_minutes(0), 0);
        assert_eq!(round_minutes(29_999), 0);
        assert_eq!(round_minutes(30_000), 1);
        assert_eq!(round_minutes(89_999), 1);
        assert_eq!(round_minutes(90_000), 2);
        assert_eq!(round_minutes(-30_000), 0);
    }

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::minutes(5));
        assert_eq!(minutes_between(start, clock.now()), 5);
    }
}
