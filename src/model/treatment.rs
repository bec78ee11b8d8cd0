//! Care-portal treatments (boluses, carbs, site changes, calibrations).

use serde::{Deserialize, Serialize};

use super::Timestamped;

/// Treatment event type, serialised with the care-portal labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    BgCheck,
    SnackBolus,
    MealBolus,
    CorrectionBolus,
    CarbCorrection,
    SiteChange,
    SensorStart,
    Note,
    Other(String),
}

impl EventType {
    pub fn label(&self) -> &str {
        match self {
            EventType::BgCheck => "BG Check",
            EventType::SnackBolus => "Snack Bolus",
            EventType::MealBolus => "Meal Bolus",
            EventType::CorrectionBolus => "Correction Bolus",
            EventType::CarbCorrection => "Carb Correction",
            EventType::SiteChange => "Site Change",
            EventType::SensorStart => "Sensor Start",
            EventType::Note => "Note",
            EventType::Other(label) => label,
        }
    }
}

impl From<String> for EventType {
    fn from(label: String) -> Self {
        match label.as_str() {
            "BG Check" => EventType::BgCheck,
            "Snack Bolus" => EventType::SnackBolus,
            "Meal Bolus" => EventType::MealBolus,
            "Correction Bolus" => EventType::CorrectionBolus,
            "Carb Correction" => EventType::CarbCorrection,
            "Site Change" => EventType::SiteChange,
            "Sensor Start" => EventType::SensorStart,
            "Note" => EventType::Note,
            _ => EventType::Other(label),
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.label().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treatment {
    #[serde(alias = "created_at_mills")]
    pub mills: i64,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insulin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glucose: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glucose_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered_by: Option<String>,
}

impl Treatment {
    pub fn new(mills: i64, event_type: EventType) -> Self {
        Self {
            mills,
            event_type,
            carbs: None,
            insulin: None,
            glucose: None,
            glucose_type: None,
            notes: None,
            entered_by: None,
        }
    }

    pub fn with_insulin(mut self, units: f64) -> Self {
        self.insulin = Some(units);
        self
    }

    pub fn with_carbs(mut self, grams: f64) -> Self {
        self.carbs = Some(grams);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_entered_by(mut self, author: impl Into<String>) -> Self {
        self.entered_by = Some(author.into());
        self
    }
}

impl Timestamped for Treatment {
    fn mills(&self) -> i64 {
        self.mills
    }
}
