//! Consecutive-day bookkeeping.
//!
//! Days are counted in whole UTC days since the unix epoch, so a "day" rolls over at midnight UTC regardless of the
//! user's local timezone.

use crate::time::{self, MILLIS_PER_DAY};

/// The day index of a timestamp given in milliseconds since the unix epoch.
pub fn day_index(epoch_millis: u128) -> i64 {
    (epoch_millis / MILLIS_PER_DAY) as i64
}

/// The day index of the current time.
pub fn today() -> i64 {
    day_index(time::now_millis())
}

/// Compute the streak after banking on `today`, given the day of the previous bank (if any) and the streak recorded
/// at that point.
pub fn next_streak(today: i64, last_day: Option<i64>, previous: u32) -> u32 {
    match last_day {
        // Banking twice in a day doesn't extend the streak. A record that has banked always has a streak of at least
        // one, even if the stored value was lost.
        Some(last) if last == today => previous.max(1),
        Some(last) if last == today - 1 => previous.saturating_add(1),
        _ => 1,
    }
}

/// The streak as it should be shown on `today`. A streak whose last bank was before yesterday has lapsed, even though
/// the stored value is only reset on the next bank.
pub fn current_streak(today: i64, last_day: Option<i64>, stored: u32) -> u32 {
    match last_day {
        Some(last) if last == today || last == today - 1 => stored,
        _ => 0,
    }
}
