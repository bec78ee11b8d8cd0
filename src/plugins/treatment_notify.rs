//! Recent treatment / calibration notifications

use crate::error::PluginError;
use crate::model::{Reading, Treatment, TEN_MINUTES_MS};
use crate::notification::{Level, SnoozeRequest};
use crate::plugin::{Capabilities, Notifier, Plugin, PluginType};
use crate::sandbox::Sandbox;

pub struct TreatmentNotifyPlugin;

/// 评估时间之前 10 分钟内的记录才算“最近”
fn is_recent(mills: i64, now: i64) -> bool {
    mills > 0 && mills <= now && now - mills < TEN_MINUTES_MS
}

fn meter_message(sbx: &Sandbox, reading: &Reading) -> String {
    format!(
        "Meter BG: {} {}",
        sbx.round_bg_display(sbx.scale_bg(reading.sgv)),
        sbx.units_label()
    )
}

/// 治疗通知正文，每个有值的字段一行
pub fn treatment_message(sbx: &Sandbox, treatment: &Treatment) -> String {
    let mut lines = Vec::new();
    if let Some(glucose) = treatment.glucose {
        match &treatment.glucose_type {
            Some(kind) => lines.push(format!("BG: {} ({})", glucose, kind)),
            None => lines.push(format!("BG: {}", glucose)),
        }
    }
    if let Some(carbs) = treatment.carbs.filter(|c| *c > 0.0) {
        lines.push(format!("Carbs: {}g", carbs));
    }
    if let Some(insulin) = treatment.insulin.filter(|i| *i > 0.0) {
        lines.push(format!("Insulin: {}U", sbx.round_insulin_display(insulin)));
    }
    if let Some(author) = treatment.entered_by.as_deref().filter(|a| !a.is_empty()) {
        lines.push(format!("Entered By: {}", author));
    }
    if let Some(notes) = treatment.notes.as_deref().filter(|n| !n.is_empty()) {
        lines.push(format!("Notes: {}", notes));
    }
    lines.join("\n")
}

impl Plugin for TreatmentNotifyPlugin {
    fn name(&self) -> &'static str {
        "treatmentnotify"
    }

    fn label(&self) -> &'static str {
        "Treatment Notifications"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Notification
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NOTIFICATION_CHECKER
    }

    fn check_notifications(&self, sbx: &Sandbox, notifier: &mut Notifier) -> Result<(), PluginError> {
        let meter = sbx
            .last_meter_reading()
            .filter(|r| is_recent(r.mills, sbx.time));
        let treatment = sbx
            .last_treatment()
            .filter(|t| is_recent(t.mills, sbx.time));

        if meter.is_none() && treatment.is_none() {
            return Ok(());
        }

        let length = sbx
            .extended_settings("treatmentnotify")
            .minutes_ms("snoozeMins")
            .unwrap_or(TEN_MINUTES_MS);
        let summary: Vec<String> = meter
            .map(|r| meter_message(sbx, r))
            .into_iter()
            .chain(treatment.map(|t| format!("Treatment: {}", t.event_type)))
            .collect();
        notifier.request_snooze(
            SnoozeRequest::new(Level::Urgent, length)
                .with_title("Snoozing alarms since there was a recent treatment")
                .with_message(summary.join("\n")),
        );

        if let Some(reading) = meter {
            // 指尖血一律视为校准
            let request = notifier
                .notification(Level::Info, "Calibration", meter_message(sbx, reading))
                .with_sound("magic");
            notifier.request_notify(request);
        }

        if let Some(treatment) = treatment {
            let request = notifier.notification(
                Level::Info,
                treatment.event_type.label(),
                treatment_message(sbx, treatment),
            );
            notifier.request_notify(request);
        }

        Ok(())
    }
}
