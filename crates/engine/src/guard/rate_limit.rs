use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use common::RateConfig;

/// Outcome of asking the limiter for one submission slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// Per-second budget spent; a slot opens at the next second boundary.
    RetryAt(DateTime<Utc>),
    /// Per-minute cap reached; nothing is admitted before the minute rolls.
    Exhausted { until: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct Windows {
    second: i64,
    second_count: u32,
    minute: i64,
    minute_count: u32,
}

/// Fixed windows aligned to wall-clock second and minute boundaries,
/// shared by every symbol.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_second: u32,
    max_per_minute: u32,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: &RateConfig) -> Self {
        Self {
            max_per_second: config.max_requests_per_second,
            max_per_minute: config.max_orders_per_minute,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Take a slot at `now` if both budgets allow it.
    pub fn try_acquire(&self, now: DateTime<Utc>) -> Admission {
        let second = now.timestamp();
        let minute = second.div_euclid(60);

        let mut w = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if w.second != second {
            w.second = second;
            w.second_count = 0;
        }
        if w.minute != minute {
            w.minute = minute;
            w.minute_count = 0;
        }

        if w.minute_count >= self.max_per_minute {
            return Admission::Exhausted {
                until: boundary(minute * 60 + 60, now + Duration::minutes(1)),
            };
        }
        if w.second_count >= self.max_per_second {
            return Admission::RetryAt(boundary(second + 1, now + Duration::seconds(1)));
        }

        w.second_count += 1;
        w.minute_count += 1;
        Admission::Granted
    }

    /// Slots used in the current (second, minute) windows.
    pub fn usage(&self) -> (u32, u32) {
        let w = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        (w.second_count, w.minute_count)
    }
}

fn boundary(epoch_secs: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(epoch_secs, 0).unwrap_or(fallback)
}
