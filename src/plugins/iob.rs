//! Insulin on board

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::plugin::{Capabilities, Pill, Plugin, PluginType, PropertyScope};
use crate::sandbox::Sandbox;

const DEFAULT_DIA_HOURS: f64 = 3.0;
const PEAK_MINUTES: f64 = 75.0;
const TAIL_END_MINUTES: f64 = 180.0;

/// `iob` property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IobResult {
    pub iob: f64,
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_bolus_mills: Option<i64>,
}

pub struct IobPlugin;

/// Remaining insulin from a single bolus `minutes_ago` minutes in the past, on the
/// bilinear curve scaled to `dia`.
pub fn insulin_remaining(insulin: f64, minutes_ago: f64, dia: f64) -> f64 {
    let scaled = (DEFAULT_DIA_HOURS / dia) * minutes_ago;
    if scaled < 0.0 {
        return 0.0;
    }
    if scaled < PEAK_MINUTES {
        let x = scaled / 5.0 + 1.0;
        insulin * (1.0 - 0.001852 * x * x + 0.001852 * x)
    } else if scaled < TAIL_END_MINUTES {
        let x = (scaled - PEAK_MINUTES) / 5.0;
        insulin * (0.001323 * x * x - 0.054233 * x + 0.55556)
    } else {
        0.0
    }
}

pub fn calculate(sbx: &Sandbox) -> IobResult {
    let dia = sbx
        .profile
        .as_ref()
        .and_then(|p| p.dia)
        .filter(|d| *d > 0.0)
        .unwrap_or(DEFAULT_DIA_HOURS);

    let mut total = 0.0;
    let mut last_bolus_mills = None;
    for treatment in sbx.treatments.iter().filter(|t| t.mills <= sbx.time) {
        let Some(insulin) = treatment.insulin.filter(|i| *i > 0.0) else {
            continue;
        };
        let minutes_ago = (sbx.time - treatment.mills) as f64 / 60_000.0;
        let remaining = insulin_remaining(insulin, minutes_ago, dia);
        if remaining > 0.0 {
            total += remaining;
        }
        last_bolus_mills = Some(treatment.mills);
    }

    IobResult {
        iob: total,
        display: sbx.round_insulin_display(total),
        last_bolus_mills,
    }
}

impl Plugin for IobPlugin {
    fn name(&self) -> &'static str {
        "iob"
    }

    fn label(&self) -> &'static str {
        "Insulin-on-Board"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::PillMinor
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROPERTY_PROVIDER | Capabilities::VISUALISATION_UPDATER
    }

    fn provides(&self) -> &'static [&'static str] {
        &["iob"]
    }

    fn set_properties(&self, scope: &mut PropertyScope<'_>) -> Result<(), PluginError> {
        scope.offer_property("iob", |sbx| Ok(Some(calculate(sbx))))
    }

    fn update_visualisation(&self, sbx: &Sandbox) -> Result<Option<Pill>, PluginError> {
        let Some(result) = sbx.property_as::<IobResult>("iob")? else {
            return Ok(None);
        };

        let mut pill = Pill::new("IOB", format!("{}U", result.display));
        if let Some(mills) = result.last_bolus_mills {
            if let Some(at) = Utc.timestamp_millis_opt(mills).single() {
                pill = pill.with_info("Last bolus", at.format("%Y-%m-%d %H:%M UTC").to_string());
            }
        }
        Ok(Some(pill))
    }
}
