//! Severity levels for notifications
//!
//! Levels are totally ordered: `None < Info < Warn < Urgent`.
//! - URGENT: must be acted on now (urgent low/high, overdue cannula)
//! - WARN: caregiver should look soon (low, high, bolus reminder)
//! - INFO: informational (treatment entered, calibration)
//! - NONE: nothing to report

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Notification severity level
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Level {
    #[default]
    None = 0,
    Info = 1,
    Warn = 2,
    Urgent = 3,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::None, Level::Info, Level::Warn, Level::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::None => "None",
            Level::Info => "Info",
            Level::Warn => "Warn",
            Level::Urgent => "Urgent",
        }
    }

    /// Numeric value used for comparison and fingerprints
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Option<Level> {
        Level::ALL.into_iter().find(|l| l.value() == value)
    }

    /// Warn and above are alarms: they are fingerprinted per plugin and can be acknowledged
    pub fn is_alarm(&self) -> bool {
        *self >= Level::Warn
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    /// Accepts names in any case, or the numeric value
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if let Ok(n) = normalized.parse::<u8>() {
            return Level::from_value(n).ok_or_else(|| format!("unknown level value: {}", n));
        }
        match normalized.as_str() {
            "none" => Ok(Level::None),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "urgent" => Ok(Level::Urgent),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

/// Check whether `level` meets a channel's minimum
pub fn level_meets_threshold(level: Level, min_level: Level) -> bool {
    level >= min_level
}
