//! Sensor (SGV) and meter (MBG) glucose readings.

use serde::{Deserialize, Serialize};

use super::Timestamped;

/// Trend arrow reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "NONE", alias = "None")]
    None,
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    #[serde(rename = "NOT COMPUTABLE", alias = "NotComputable")]
    NotComputable,
    #[serde(rename = "RATE OUT OF RANGE", alias = "RateOutOfRange")]
    RateOutOfRange,
}

impl Direction {
    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::None => "⇼",
            Direction::DoubleUp => "⇈",
            Direction::SingleUp => "↑",
            Direction::FortyFiveUp => "↗",
            Direction::Flat => "→",
            Direction::FortyFiveDown => "↘",
            Direction::SingleDown => "↓",
            Direction::DoubleDown => "⇊",
            Direction::NotComputable => "-",
            Direction::RateOutOfRange => "⇕",
        }
    }
}

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceType {
    /// Continuous glucose sensor value
    #[default]
    #[serde(rename = "sgv")]
    Sensor,
    /// Finger-stick meter value (calibration)
    #[serde(rename = "mbg")]
    Meter,
}

/// A single glucose reading, canonical mg/dL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(alias = "date")]
    pub mills: i64,
    #[serde(alias = "mbg")]
    pub sgv: f64,
    #[serde(default)]
    pub direction: Direction,
    #[serde(rename = "type", default)]
    pub source: SourceType,
}

impl Reading {
    pub fn sensor(mills: i64, sgv: f64) -> Self {
        Self {
            mills,
            sgv,
            direction: Direction::None,
            source: SourceType::Sensor,
        }
    }

    pub fn meter(mills: i64, mbg: f64) -> Self {
        Self {
            mills,
            sgv: mbg,
            direction: Direction::None,
            source: SourceType::Meter,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

impl Timestamped for Reading {
    fn mills(&self) -> i64 {
        self.mills
    }
}
