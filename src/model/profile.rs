//! Treatment profile with time-of-day schedules.
//!
//! Schedule values are in the user's display units (like targets entered in the
//! care portal); `dia` is duration of insulin action in hours.

use serde::{Deserialize, Serialize};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// One step of a daily schedule, active from `time` (HH:MM) until the next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub time: String,
    pub value: f64,
}

impl ScheduleEntry {
    pub fn new(time: impl Into<String>, value: f64) -> Self {
        Self {
            time: time.into(),
            value,
        }
    }

    fn start_minute(&self) -> Option<i64> {
        let (hours, minutes) = self.time.split_once(':')?;
        let hours: i64 = hours.trim().parse().ok()?;
        let minutes: i64 = minutes.trim().parse().ok()?;
        if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
            return None;
        }
        Some(hours * 60 + minutes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub dia: Option<f64>,
    pub sens: Vec<ScheduleEntry>,
    pub target_high: Vec<ScheduleEntry>,
    pub target_low: Vec<ScheduleEntry>,
    pub basal: Vec<ScheduleEntry>,
    /// Offset of the profile's local time from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl Profile {
    pub fn has_data(&self) -> bool {
        !self.sens.is_empty() || !self.target_high.is_empty() || !self.target_low.is_empty()
    }

    pub fn sensitivity(&self, mills: i64) -> Option<f64> {
        self.lookup(&self.sens, mills)
    }

    pub fn high_target(&self, mills: i64) -> Option<f64> {
        self.lookup(&self.target_high, mills)
    }

    pub fn low_target(&self, mills: i64) -> Option<f64> {
        self.lookup(&self.target_low, mills)
    }

    pub fn basal(&self, mills: i64) -> Option<f64> {
        self.lookup(&self.basal, mills)
    }

    pub fn has_basal(&self) -> bool {
        !self.basal.is_empty()
    }

    /// Last entry whose start is at or before the local time of day.
    fn lookup(&self, schedule: &[ScheduleEntry], mills: i64) -> Option<f64> {
        let local = mills + i64::from(self.utc_offset_minutes) * 60_000;
        let minute_of_day = local.rem_euclid(DAY_MS) / 60_000;

        let mut steps: Vec<(i64, f64)> = schedule
            .iter()
            .filter_map(|e| e.start_minute().map(|m| (m, e.value)))
            .collect();
        steps.sort_by_key(|(m, _)| *m);

        let mut current = steps.first().map(|(_, v)| *v);
        for (start, value) in steps {
            if start <= minute_of_day {
                current = Some(value);
            }
        }
        // zero is "not configured" for the care portal
        current.filter(|v| *v != 0.0)
    }
}
