//! When the `fake_time` feature is disabled, this module just re-exports [std::time::SystemTime].
//!
//! When the `fake_time` feature is enabled, an alternative fake [SystemTime] is exported, which can be controlled by
//! the `pause_at_epoch` and `advance` methods. Streak bookkeeping depends on the wall clock, so this lets tests cross
//! day boundaries deterministically.

use std::time::Duration;

#[cfg(not(feature = "fake_time"))]
pub type SystemTime = std::time::SystemTime;

#[cfg(feature = "fake_time")]
pub use time_impl::*;

pub const MILLIS_PER_DAY: u128 = 86_400_000;

/// Milliseconds elapsed since the unix epoch according to [SystemTime].
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
}

/// The calendar date (UTC) a day index falls on, if it is representable.
pub fn date_of_day(day: i64) -> Option<time::Date> {
    let seconds = day.checked_mul(86_400)?;
    time::OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .map(|t| t.date())
}

#[cfg(feature = "fake_time")]
mod time_impl {
    use std::{cell::Cell, time::Duration};

    /// A fake implementation of [std::time::SystemTime]. The value of `SystemTime::now` can be controlled with
    /// [advance].
    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
    pub struct SystemTime(std::time::SystemTime);

    impl SystemTime {
        pub const UNIX_EPOCH: SystemTime = SystemTime(std::time::SystemTime::UNIX_EPOCH);

        pub fn now() -> Self {
            match CURRENT_TIME.with(Cell::get) {
                Some(offset) => SystemTime(std::time::SystemTime::UNIX_EPOCH + offset),
                None => SystemTime(std::time::SystemTime::now()),
            }
        }

        pub fn duration_since(&self, other: SystemTime) -> Result<Duration, SystemTimeError> {
            self.0
                .duration_since(other.0)
                .map_err(|e| SystemTimeError(e.duration()))
        }
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
    pub struct SystemTimeError(Duration);

    impl SystemTimeError {
        pub fn duration(&self) -> Duration {
            self.0
        }
    }

    thread_local! {
        /// Offset of the fake time from the `UNIX_EPOCH`, or `None` if time is not paused. This is per thread, so
        /// tests running on current-thread runtimes don't interfere with each other.
        static CURRENT_TIME: Cell<Option<Duration>> = const { Cell::new(None) };
    }

    /// Pause the fake time at the unix epoch. Calling it again resets the clock to the epoch.
    pub fn pause_at_epoch() {
        CURRENT_TIME.with(|t| t.set(Some(Duration::ZERO)));
    }

    /// Advance the fake time by this duration. Panics if time has not been paused with `pause_at_epoch()`.
    pub fn advance(delta: Duration) {
        CURRENT_TIME.with(|t| match t.get() {
            Some(current) => t.set(Some(current + delta)),
            None => panic!("time is not paused"),
        });
    }
}
