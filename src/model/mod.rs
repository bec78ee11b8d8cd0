//! Glucose data model: sensor/meter readings, treatments, profiles and units.

pub mod profile;
pub mod reading;
pub mod treatment;
pub mod units;

pub use profile::{Profile, ScheduleEntry};
pub use reading::{Direction, Reading, SourceType};
pub use treatment::{EventType, Treatment};
pub use units::{mgdl_to_mmol, Units};

pub const ONE_MINUTE_MS: i64 = 60_000;
pub const FIVE_MINUTES_MS: i64 = 5 * ONE_MINUTE_MS;
pub const TEN_MINUTES_MS: i64 = 10 * ONE_MINUTE_MS;
pub const ONE_HOUR_MS: i64 = 60 * ONE_MINUTE_MS;

/// Anything stored with an epoch-millisecond timestamp.
pub trait Timestamped {
    fn mills(&self) -> i64;
}

/// Current wall clock as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Latest item at or before `time`, assuming `items` is sorted ascending.
pub fn last_at_or_before<T: Timestamped>(items: &[T], time: i64) -> Option<&T> {
    items.iter().rev().find(|item| item.mills() <= time)
}
