//! Cannula age

use chrono::{TimeZone, Utc};
use serde::Serialize;

use crate::error::PluginError;
use crate::model::{ONE_HOUR_MS, ONE_MINUTE_MS};
use crate::notification::Level;
use crate::plugin::{Capabilities, Notifier, Pill, Plugin, PluginType};
use crate::sandbox::Sandbox;

/// 通知只在整点后 30 分钟内发出
const ALERT_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct CagePrefs {
    pub info: f64,
    pub warn: f64,
    pub urgent: f64,
    pub display_days: bool,
    pub enable_alerts: bool,
}

impl CagePrefs {
    pub fn from_sandbox(sbx: &Sandbox) -> Self {
        let ext = sbx.extended_settings("cage");
        Self {
            info: ext.number("info").unwrap_or(44.0),
            warn: ext.number("warn").unwrap_or(48.0),
            urgent: ext.number("urgent").unwrap_or(72.0),
            display_days: ext.string("display") == Some("days"),
            enable_alerts: ext.flag("enableAlerts").unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CannulaInfo {
    pub found: bool,
    pub inserted_mills: Option<i64>,
    /// 整小时数
    pub age: i64,
    pub days: i64,
    pub hours: i64,
    /// 当前小时内已过的分钟
    pub min_fractions: i64,
    pub level: Level,
    pub notes: Option<String>,
}

pub struct CagePlugin;

/// 找到评估时间之前最近一次更换，计算年龄和级别
pub fn latest_change(sbx: &Sandbox, prefs: &CagePrefs) -> CannulaInfo {
    let latest = sbx
        .site_change_treatments()
        .filter(|t| t.mills <= sbx.time)
        .max_by_key(|t| t.mills);

    let Some(treatment) = latest else {
        return CannulaInfo {
            found: false,
            inserted_mills: None,
            age: 0,
            days: 0,
            hours: 0,
            min_fractions: 0,
            level: Level::None,
            notes: None,
        };
    };

    let elapsed = sbx.time - treatment.mills;
    let age = elapsed / ONE_HOUR_MS;
    let days = age / 24;
    let age_f = age as f64;

    let level = if age_f >= prefs.urgent {
        Level::Urgent
    } else if age_f >= prefs.warn {
        Level::Warn
    } else if age_f >= prefs.info {
        Level::Info
    } else {
        Level::None
    };

    CannulaInfo {
        found: true,
        inserted_mills: Some(treatment.mills),
        age,
        days,
        hours: age - days * 24,
        min_fractions: elapsed / ONE_MINUTE_MS - age * 60,
        level,
        notes: treatment.notes.clone().filter(|n| !n.is_empty()),
    }
}

impl Plugin for CagePlugin {
    fn name(&self) -> &'static str {
        "cage"
    }

    fn label(&self) -> &'static str {
        "Cannula Age"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::PillMinor
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NOTIFICATION_CHECKER | Capabilities::VISUALISATION_UPDATER
    }

    fn check_notifications(&self, sbx: &Sandbox, notifier: &mut Notifier) -> Result<(), PluginError> {
        let prefs = CagePrefs::from_sandbox(sbx);
        if !prefs.enable_alerts {
            return Ok(());
        }
        let info = latest_change(sbx, &prefs);

        let (threshold, message, sound) = match info.level {
            Level::Urgent => (prefs.urgent, "Cannula change overdue!", "persistent"),
            Level::Warn => (prefs.warn, "Time to change cannula", "incoming"),
            Level::Info => (prefs.info, "Change cannula soon", "incoming"),
            Level::None => return Ok(()),
        };

        // 只在刚到达阈值的那个小时内提醒
        if info.age as f64 != threshold || info.min_fractions > ALERT_WINDOW_MINUTES {
            return Ok(());
        }

        let request = notifier
            .notification(info.level, format!("Cannula age {} hours", info.age), message)
            .with_sound(sound)
            .with_group("CAGE")
            .with_debug(serde_json::json!({ "age": info.age }));
        notifier.request_notify(request);
        Ok(())
    }

    fn update_visualisation(&self, sbx: &Sandbox) -> Result<Option<Pill>, PluginError> {
        let prefs = CagePrefs::from_sandbox(sbx);
        let info = latest_change(sbx, &prefs);

        let shown_age = if !info.found {
            "n/a".to_string()
        } else if prefs.display_days {
            if info.age >= 24 {
                format!("{}d{}h", info.days, info.hours)
            } else {
                format!("{}h", info.hours)
            }
        } else {
            format!("{}h", info.age)
        };

        let class = match info.level {
            Level::Urgent => Some("urgent"),
            Level::Warn => Some("warn"),
            _ => None,
        };

        let mut pill = Pill::new("CAGE", shown_age).with_class(class);
        if let Some(at) = info
            .inserted_mills
            .and_then(|m| Utc.timestamp_millis_opt(m).single())
        {
            pill = pill.with_info("Inserted", at.format("%Y-%m-%d %H:%M UTC").to_string());
        }
        if let Some(notes) = info.notes {
            pill = pill.with_info("Notes:", notes);
        }
        Ok(Some(pill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, Treatment};
    use crate::notification::NotificationRequest;
    use crate::sandbox::PluginSettings;
    use serde_json::json;

    const T0: i64 = 1_700_000_000_000;

    fn sandbox_at(age_ms: i64) -> Sandbox {
        Sandbox::new(T0 + age_ms).with_treatments(vec![
            Treatment::new(T0 - 10 * ONE_HOUR_MS, EventType::SiteChange),
            Treatment::new(T0, EventType::SiteChange).with_notes("left arm"),
            Treatment::new(T0 + age_ms + ONE_HOUR_MS, EventType::SiteChange),
        ])
    }

    fn check(sbx: &Sandbox) -> Vec<NotificationRequest> {
        let mut notifier = Notifier::new("cage");
        CagePlugin.check_notifications(sbx, &mut notifier).unwrap();
        notifier.into_parts().0
    }

    #[test]
    fn test_warn_exactly_at_48_hours() {
        let requests = check(&sandbox_at(48 * ONE_HOUR_MS));
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].level, Level::Warn);
        assert_eq!(requests[0].title, "Cannula age 48 hours");
        assert_eq!(requests[0].message, "Time to change cannula");
        assert_eq!(requests[0].group.as_deref(), Some("CAGE"));

        // 窗口内仍然相同（由去重缓存防止重复发送）
        let later = check(&sandbox_at(48 * ONE_HOUR_MS + 20 * ONE_MINUTE_MS));
        assert_eq!(later, requests);
    }

    #[test]
    fn test_no_notification_outside_window() {
        assert!(check(&sandbox_at(48 * ONE_HOUR_MS + 31 * ONE_MINUTE_MS)).is_empty());
        assert!(check(&sandbox_at(49 * ONE_HOUR_MS)).is_empty());
        assert!(check(&sandbox_at(47 * ONE_HOUR_MS)).is_empty());
    }

    #[test]
    fn test_info_and_urgent_thresholds() {
        let info = check(&sandbox_at(44 * ONE_HOUR_MS));
        assert_eq!(info[0].level, Level::Info);
        assert_eq!(info[0].message, "Change cannula soon");

        let urgent = check(&sandbox_at(72 * ONE_HOUR_MS));
        assert_eq!(urgent[0].level, Level::Urgent);
        assert_eq!(urgent[0].sound.as_deref(), Some("persistent"));
    }

    #[test]
    fn test_custom_thresholds_and_disabled_alerts() {
        let mut settings = PluginSettings::new();
        settings.insert("warn".to_string(), json!("36"));
        let sbx = sandbox_at(36 * ONE_HOUR_MS).with_extended_settings("cage", settings);
        assert_eq!(check(&sbx)[0].level, Level::Warn);

        let mut settings = PluginSettings::new();
        settings.insert("enableAlerts".to_string(), json!(false));
        let sbx = sandbox_at(48 * ONE_HOUR_MS).with_extended_settings("cage", settings);
        assert!(check(&sbx).is_empty());
    }

    #[test]
    fn test_pill_display() {
        let sbx = sandbox_at(48 * ONE_HOUR_MS + 5 * ONE_MINUTE_MS);
        let pill = CagePlugin.update_visualisation(&sbx).unwrap().unwrap();
        assert_eq!(pill.value, "48h");
        assert_eq!(pill.class.as_deref(), Some("warn"));
        assert_eq!(pill.info[1].value, "left arm");

        let mut settings = PluginSettings::new();
        settings.insert("display".to_string(), json!("days"));
        let pill = CagePlugin
            .update_visualisation(&sbx.with_extended_settings("cage", settings))
            .unwrap()
            .unwrap();
        assert_eq!(pill.value, "2d0h");

        let none = CagePlugin.update_visualisation(&Sandbox::new(T0)).unwrap().unwrap();
        assert_eq!(none.value, "n/a");
    }
}
