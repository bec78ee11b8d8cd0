//! Bolus Wizard Preview
//!
//! Estimates the correction bolus needed to bring the expected outcome
//! (`bg - iob * sens`) back inside the profile's target range.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::iob::IobResult;
use crate::error::PluginError;
use crate::model::TEN_MINUTES_MS;
use crate::notification::{Level, SnoozeRequest};
use crate::plugin::{Capabilities, Notifier, Pill, Plugin, PluginType, PropertyScope};
use crate::sandbox::Sandbox;

const MIN_VALID_SGV: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempBasalAdjustment {
    /// percent of the scheduled basal
    pub thirtymin: i64,
    pub onehour: i64,
}

/// `bwp` property; BG values are in display units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BwpResult {
    pub last_sgv: f64,
    pub iob: f64,
    pub effect: f64,
    pub outcome: f64,
    pub bolus_estimate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_basal_adjustment: Option<TempBasalAdjustment>,
    pub bolus_estimate_display: String,
    pub outcome_display: f64,
    pub display_iob: String,
    pub effect_display: f64,
    pub display_line: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BwpSettings {
    pub snooze: f64,
    pub warn: f64,
    pub urgent: f64,
    pub snooze_mills: i64,
}

impl BwpSettings {
    pub fn from_sandbox(sbx: &Sandbox) -> Self {
        let ext = sbx.extended_settings("bwp");
        Self {
            snooze: ext.number("snooze").filter(|v| *v != 0.0).unwrap_or(0.10),
            warn: ext.number("warn").filter(|v| *v != 0.0).unwrap_or(0.50),
            urgent: ext.number("urgent").filter(|v| *v != 0.0).unwrap_or(1.00),
            snooze_mills: ext.minutes_ms("snoozeMins").unwrap_or(TEN_MINUTES_MS),
        }
    }
}

pub struct BwpPlugin;

/// Reasons the preview can't be computed this cycle
fn missing_info(sbx: &Sandbox) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    let profile = sbx.profile.as_ref().filter(|p| p.has_data());
    match profile {
        None => warnings.push("missing treatment profile"),
        Some(p) => {
            if p.sensitivity(sbx.time).is_none()
                || p.high_target(sbx.time).is_none()
                || p.low_target(sbx.time).is_none()
            {
                warnings.push("missing sens, target_high or target_low profile fields");
            }
        }
    }
    if !sbx.has_property("iob") {
        warnings.push("missing iob property");
    }
    match (sbx.last_sgv(), sbx.last_sgv_mills()) {
        (Some(sgv), Some(mills)) if sgv >= MIN_VALID_SGV && sbx.time - mills <= TEN_MINUTES_MS => {}
        _ => warnings.push("data isn't current"),
    }
    warnings
}

pub fn calculate(sbx: &Sandbox) -> Result<Option<BwpResult>, PluginError> {
    let warnings = missing_info(sbx);
    if !warnings.is_empty() {
        debug!(plugin = "bwp", warnings = %warnings.join("; "), "Bolus wizard preview skipped");
        return Ok(None);
    }

    let (Some(profile), Some(sgv), Some(iob)) = (
        sbx.profile.as_ref(),
        sbx.last_scaled_sgv(),
        sbx.property_as::<IobResult>("iob")?,
    ) else {
        return Ok(None);
    };
    let (Some(sens), Some(target_high), Some(target_low)) = (
        profile.sensitivity(sbx.time),
        profile.high_target(sbx.time),
        profile.low_target(sbx.time),
    ) else {
        return Ok(None);
    };

    let effect = iob.iob * sens;
    let outcome = sgv - effect;
    let mut bolus_estimate = 0.0;
    if outcome > target_high {
        bolus_estimate = (outcome - target_high) / sens;
    }
    if outcome < target_low {
        bolus_estimate = -(target_low - outcome) / sens;
    }

    let temp_basal_adjustment = match profile.basal(sbx.time) {
        Some(basal) if bolus_estimate != 0.0 => Some(TempBasalAdjustment {
            thirtymin: ((basal / 2.0 + bolus_estimate) / (basal / 2.0) * 100.0).round() as i64,
            onehour: ((basal + bolus_estimate) / basal * 100.0).round() as i64,
        }),
        _ => None,
    };

    let bolus_estimate_display = sbx.round_insulin_display(bolus_estimate);
    Ok(Some(BwpResult {
        last_sgv: sgv,
        iob: iob.iob,
        effect,
        outcome,
        bolus_estimate,
        temp_basal_adjustment,
        display_line: format!("BWP: {}U", bolus_estimate_display),
        bolus_estimate_display,
        outcome_display: sbx.round_bg_display(outcome),
        display_iob: sbx.round_insulin_display(iob.iob),
        effect_display: sbx.round_bg_display(effect),
    }))
}

impl Plugin for BwpPlugin {
    fn name(&self) -> &'static str {
        "bwp"
    }

    fn label(&self) -> &'static str {
        "Bolus Wizard Preview"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::PillMinor
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROPERTY_PROVIDER
            | Capabilities::NOTIFICATION_CHECKER
            | Capabilities::VISUALISATION_UPDATER
    }

    fn provides(&self) -> &'static [&'static str] {
        &["bwp"]
    }

    fn requires(&self) -> &'static [&'static str] {
        &["iob"]
    }

    fn set_properties(&self, scope: &mut PropertyScope<'_>) -> Result<(), PluginError> {
        scope.offer_property("bwp", calculate)
    }

    fn check_notifications(&self, sbx: &Sandbox, notifier: &mut Notifier) -> Result<(), PluginError> {
        let Some(results) = sbx.property_as::<BwpResult>("bwp")? else {
            return Ok(());
        };
        let Some(target_high) = sbx.profile.as_ref().and_then(|p| p.high_target(sbx.time)) else {
            return Ok(());
        };
        if results.last_sgv < target_high {
            return Ok(());
        }

        let settings = BwpSettings::from_sandbox(sbx);
        let debug = serde_json::to_value(&results)?;
        let target_top = sbx.scale_bg(sbx.thresholds.bg_target_top);

        if results.last_sgv > target_top && results.bolus_estimate < settings.snooze {
            notifier.request_snooze(
                SnoozeRequest::new(Level::Urgent, settings.snooze_mills)
                    .with_title("Snoozing alarms, bolus wizard shows enough insulin on board")
                    .with_message(results.display_line.clone()),
            );
        } else if results.bolus_estimate > settings.warn {
            let level = if results.bolus_estimate > settings.urgent {
                Level::Urgent
            } else {
                Level::Warn
            };
            let sound = if level == Level::Urgent { "updown" } else { "bike" };
            let request = notifier
                .notification(
                    level,
                    format!("{}, Check BG, time to bolus?", level),
                    sbx.build_default_message(),
                )
                .with_event_name("bwp")
                .with_sound(sound)
                .with_debug(debug);
            notifier.request_notify(request);
        }
        Ok(())
    }

    fn update_visualisation(&self, sbx: &Sandbox) -> Result<Option<Pill>, PluginError> {
        let Some(results) = sbx.property_as::<BwpResult>("bwp")? else {
            return Ok(None);
        };
        let units = sbx.units_label();

        let mut pill = Pill::new("BWP", format!("{}U", results.bolus_estimate_display))
            .with_info("Insulin on Board", format!("{}U", results.display_iob))
            .with_info("Expected effect", format!("-{} {}", results.effect_display, units))
            .with_info("Expected outcome", format!("{} {}", results.outcome_display, units));

        if let Some(adjustment) = results.temp_basal_adjustment {
            for (label, percent) in [
                ("30m temp basal", adjustment.thirtymin),
                ("1h temp basal", adjustment.onehour),
            ] {
                let value = if percent > 0 {
                    format!("{}%", percent)
                } else {
                    "too large adjustment needed, give carbs?".to_string()
                };
                pill = pill.with_info(label, value);
            }
        }
        Ok(Some(pill))
    }
}
