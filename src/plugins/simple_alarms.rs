//! Threshold alarms on the latest sensor reading

use crate::error::PluginError;
use crate::model::{Direction, Reading, TEN_MINUTES_MS};
use crate::notification::Level;
use crate::plugin::{Capabilities, Notifier, Plugin, PluginType};
use crate::sandbox::{Sandbox, Thresholds};

/// 低于此值视为传感器错误码
const CGM_ERROR_BELOW: f64 = 39.0;
const TREND_PIVOT: f64 = 120.0;
const PERFECT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alarm {
    pub level: Level,
    pub title: &'static str,
    pub sound: &'static str,
}

impl Alarm {
    const fn new(level: Level, title: &'static str, sound: &'static str) -> Self {
        Self { level, title, sound }
    }
}

/// 按优先顺序匹配第一条规则
pub fn classify(reading: &Reading, thresholds: &Thresholds) -> Option<Alarm> {
    let sgv = reading.sgv;
    let alarm = if sgv < CGM_ERROR_BELOW {
        Alarm::new(Level::Warn, "CGM Error", "persistent")
    } else if sgv < thresholds.bg_low {
        Alarm::new(Level::Urgent, "Urgent Low", "persistent")
    } else if sgv < thresholds.bg_target_bottom {
        Alarm::new(Level::Warn, "Low", "falling")
    } else if sgv < TREND_PIVOT && reading.direction == Direction::DoubleDown {
        Alarm::new(Level::Warn, "Double Down", "falling")
    } else if sgv == PERFECT && reading.direction == Direction::Flat {
        Alarm::new(Level::Info, "Perfect", "cashregister")
    } else if sgv > TREND_PIVOT && reading.direction == Direction::DoubleUp {
        Alarm::new(Level::Warn, "Double Up", "intermission")
    } else if sgv > thresholds.bg_high {
        Alarm::new(Level::Urgent, "Urgent High", "updown")
    } else if sgv > thresholds.bg_target_top {
        Alarm::new(Level::Warn, "High", "climb")
    } else {
        return None;
    };
    Some(alarm)
}

pub struct SimpleAlarmsPlugin;

impl Plugin for SimpleAlarmsPlugin {
    fn name(&self) -> &'static str {
        "simplealarms"
    }

    fn label(&self) -> &'static str {
        "Simple Alarms"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Notification
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NOTIFICATION_CHECKER
    }

    fn check_notifications(&self, sbx: &Sandbox, notifier: &mut Notifier) -> Result<(), PluginError> {
        let Some(reading) = sbx.last_reading() else {
            return Ok(());
        };
        if sbx.time - reading.mills > TEN_MINUTES_MS {
            tracing::debug!(plugin = "simplealarms", mills = reading.mills, "Latest reading is stale");
            return Ok(());
        }

        if let Some(alarm) = classify(reading, &sbx.thresholds) {
            let request = notifier
                .notification(alarm.level, alarm.title, sbx.build_default_message())
                .with_sound(alarm.sound)
                .with_event_name(alarm.title);
            notifier.request_notify(request);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ONE_MINUTE_MS;

    const T0: i64 = 1_700_000_000_000;

    fn title_for(sgv: f64, direction: Direction) -> Option<&'static str> {
        classify(
            &Reading::sensor(T0, sgv).with_direction(direction),
            &Thresholds::default(),
        )
        .map(|a| a.title)
    }

    #[test]
    fn test_threshold_order() {
        assert_eq!(title_for(30.0, Direction::Flat), Some("CGM Error"));
        assert_eq!(title_for(50.0, Direction::Flat), Some("Urgent Low"));
        assert_eq!(title_for(70.0, Direction::DoubleDown), Some("Low"));
        assert_eq!(title_for(110.0, Direction::DoubleDown), Some("Double Down"));
        assert_eq!(title_for(100.0, Direction::Flat), Some("Perfect"));
        assert_eq!(title_for(100.0, Direction::FortyFiveUp), None);
        assert_eq!(title_for(150.0, Direction::DoubleUp), Some("Double Up"));
        assert_eq!(title_for(300.0, Direction::Flat), Some("Urgent High"));
        assert_eq!(title_for(200.0, Direction::Flat), Some("High"));
        assert_eq!(title_for(140.0, Direction::SingleUp), None);
    }

    #[test]
    fn test_urgent_low_notification() {
        let sbx = Sandbox::new(T0).with_readings(vec![
            Reading::sensor(T0 - 5 * ONE_MINUTE_MS, 60.0),
            Reading::sensor(T0, 50.0).with_direction(Direction::SingleDown),
        ]);
        let mut notifier = Notifier::new("simplealarms");
        SimpleAlarmsPlugin.check_notifications(&sbx, &mut notifier).unwrap();
        let (requests, snoozes) = notifier.into_parts();

        assert!(snoozes.is_empty());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].level, Level::Urgent);
        assert_eq!(requests[0].title, "Urgent Low");
        assert_eq!(requests[0].message, "BG Now: 50 -10 ↓ mg/dl");
        assert_eq!(requests[0].sound.as_deref(), Some("persistent"));
    }

    #[test]
    fn test_stale_reading_is_ignored() {
        let sbx = Sandbox::new(T0 + 11 * ONE_MINUTE_MS).with_readings(vec![Reading::sensor(T0, 40.0)]);
        let mut notifier = Notifier::new("simplealarms");
        SimpleAlarmsPlugin.check_notifications(&sbx, &mut notifier).unwrap();
        assert!(notifier.into_parts().0.is_empty());
    }
}
