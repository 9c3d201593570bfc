//! Timestamp utilities
//!
//! Cache rows store timestamps as unix milliseconds (INTEGER columns).

use chrono::Utc;

/// Current time as unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Elapsed time between a stored timestamp and `now`, clamped at zero
pub fn age_millis(then_millis: i64, now_millis: i64) -> u64 {
    now_millis.saturating_sub(then_millis).max(0) as u64
}
