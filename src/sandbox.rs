//! 周期快照（Sandbox）
//!
//! 每个周期由调度方构建一次：最近的读数、治疗记录、配置文件、阈值和各插件的扩展设置。
//! 插件只读访问；派生属性只能由插件注册表在插件成功后写入。

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::config::Config;
use crate::error::PluginError;
use crate::model::{
    last_at_or_before, EventType, Profile, Reading, SourceType, Treatment, Units, ONE_MINUTE_MS,
    TEN_MINUTES_MS,
};

/// 分钟数设置的上限（一周）
const MAX_SETTING_MINUTES: f64 = 7.0 * 24.0 * 60.0;

/// 阈值配置（mg/dL）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub bg_high: f64,
    pub bg_target_top: f64,
    pub bg_target_bottom: f64,
    pub bg_low: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            bg_high: 260.0,
            bg_target_top: 180.0,
            bg_target_bottom: 80.0,
            bg_low: 55.0,
        }
    }
}

/// 胰岛素显示的取整方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsulinRounding {
    #[default]
    Generic,
    Medtronic,
}

/// 单个插件的扩展设置
pub type PluginSettings = HashMap<String, Value>;

/// 扩展设置的只读视图，数字和布尔值也接受字符串形式（来自环境变量的配置）
#[derive(Debug, Clone, Copy)]
pub struct ExtendedSettings<'a> {
    settings: Option<&'a PluginSettings>,
}

impl<'a> ExtendedSettings<'a> {
    pub fn new(settings: Option<&'a PluginSettings>) -> Self {
        Self { settings }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.settings.and_then(|s| s.get(key))
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn string(&self, key: &str) -> Option<&'a str> {
        self.get(key)?.as_str()
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Some(true),
                "false" | "off" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 大于 0 的分钟数设置，换算成毫秒，最长一周
    pub fn minutes_ms(&self, key: &str) -> Option<i64> {
        self.number(key)
            .filter(|m| m.is_finite() && *m > 0.0)
            .map(|m| (m.min(MAX_SETTING_MINUTES) * ONE_MINUTE_MS as f64) as i64)
    }
}

/// 周期快照
#[derive(Debug, Clone, Default, Serialize)]
pub struct Sandbox {
    /// 评估时间（epoch 毫秒）
    pub time: i64,
    /// 传感器读数，时间升序
    pub readings: Vec<Reading>,
    /// 指尖血读数，时间升序
    pub meter_readings: Vec<Reading>,
    /// 治疗记录，时间升序
    pub treatments: Vec<Treatment>,
    pub profile: Option<Profile>,
    pub thresholds: Thresholds,
    pub units: Units,
    pub insulin_rounding: InsulinRounding,
    extended_settings: HashMap<String, PluginSettings>,
    properties: BTreeMap<String, Value>,
}

impl Sandbox {
    pub fn new(time: i64) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    /// 按来源拆分读数并排序
    pub fn with_readings(mut self, readings: impl IntoIterator<Item = Reading>) -> Self {
        for reading in readings {
            match reading.source {
                SourceType::Sensor => self.readings.push(reading),
                SourceType::Meter => self.meter_readings.push(reading),
            }
        }
        self.readings.sort_by_key(|r| r.mills);
        self.meter_readings.sort_by_key(|r| r.mills);
        self
    }

    pub fn with_treatments(mut self, treatments: impl IntoIterator<Item = Treatment>) -> Self {
        self.treatments.extend(treatments);
        self.treatments.sort_by_key(|t| t.mills);
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn with_insulin_rounding(mut self, rounding: InsulinRounding) -> Self {
        self.insulin_rounding = rounding;
        self
    }

    pub fn with_extended_settings(mut self, plugin: impl Into<String>, settings: PluginSettings) -> Self {
        self.extended_settings.insert(plugin.into(), settings);
        self
    }

    pub fn with_all_extended_settings(mut self, settings: HashMap<String, PluginSettings>) -> Self {
        self.extended_settings.extend(settings);
        self
    }

    /// 插件自己的扩展设置
    pub fn extended_settings(&self, plugin: &str) -> ExtendedSettings<'_> {
        ExtendedSettings::new(self.extended_settings.get(plugin))
    }

    // ---- 读数 ----

    /// 评估时间之前最新的传感器读数
    pub fn last_reading(&self) -> Option<&Reading> {
        last_at_or_before(&self.readings, self.time)
    }

    pub fn last_sgv(&self) -> Option<f64> {
        self.last_reading().map(|r| r.sgv)
    }

    pub fn last_sgv_mills(&self) -> Option<i64> {
        self.last_reading().map(|r| r.mills)
    }

    /// 最新读数换算到显示单位
    pub fn last_scaled_sgv(&self) -> Option<f64> {
        self.last_sgv().map(|v| self.scale_bg(v))
    }

    pub fn last_meter_reading(&self) -> Option<&Reading> {
        last_at_or_before(&self.meter_readings, self.time)
    }

    pub fn last_treatment(&self) -> Option<&Treatment> {
        last_at_or_before(&self.treatments, self.time)
    }

    /// 最近两个读数之差（mg/dL），两者相隔超过 10 分钟时没有意义
    pub fn delta(&self) -> Option<f64> {
        let current: Vec<&Reading> = self
            .readings
            .iter()
            .filter(|r| r.mills <= self.time)
            .collect();
        let [.., previous, last] = current.as_slice() else {
            return None;
        };
        if last.mills - previous.mills > TEN_MINUTES_MS {
            return None;
        }
        Some(last.sgv - previous.sgv)
    }

    /// 带符号的显示用差值，如 `+5`、`-0.3`
    pub fn delta_display(&self) -> Option<String> {
        let delta = self.delta()?;
        let scaled = match self.units {
            Units::MgDl => delta.round(),
            Units::Mmol => (delta / crate::model::units::MMOL_TO_MGDL * 10.0).round() / 10.0,
        };
        let sign = if scaled >= 0.0 { "+" } else { "" };
        Some(format!("{}{}", sign, scaled))
    }

    pub fn site_change_treatments(&self) -> impl Iterator<Item = &Treatment> {
        self.treatments
            .iter()
            .filter(|t| t.event_type == EventType::SiteChange)
    }

    // ---- 单位与显示 ----

    pub fn scale_bg(&self, mgdl: f64) -> f64 {
        self.units.scale(mgdl)
    }

    pub fn units_label(&self) -> &'static str {
        self.units.label()
    }

    pub fn round_bg_display(&self, value: f64) -> f64 {
        self.units.round_for_display(value)
    }

    pub fn round_insulin_display(&self, insulin: f64) -> String {
        round_insulin(insulin, self.insulin_rounding)
    }

    // ---- 派生属性 ----

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// 按类型读取派生属性
    pub fn property_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PluginError> {
        self.properties
            .get(name)
            .map(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| PluginError::PropertyShape(name.to_string(), e))
            })
            .transpose()
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub(crate) fn commit_properties(&mut self, staged: BTreeMap<String, Value>) {
        self.properties.extend(staged);
    }

    /// 默认通知正文：当前血糖、差值、箭头，加上 IOB / BWP 等已有属性
    pub fn build_default_message(&self) -> String {
        let mut message = match self.last_reading() {
            Some(reading) => {
                let mut line = format!("BG Now: {}", self.round_bg_display(self.scale_bg(reading.sgv)));
                if let Some(delta) = self.delta_display() {
                    line.push(' ');
                    line.push_str(&delta);
                }
                if reading.direction != crate::model::Direction::None {
                    line.push(' ');
                    line.push_str(reading.direction.arrow());
                }
                line.push(' ');
                line.push_str(self.units_label());
                line
            }
            None => "BG Now: ---".to_string(),
        };

        if let Some(predicted) = self
            .property("ar2")
            .and_then(|v| v.get("predicted"))
            .and_then(|p| p.get(2))
            .and_then(|p| p.get("sgv"))
            .and_then(Value::as_f64)
        {
            message.push_str(&format!(
                "\nBG 15m: {} {}",
                self.round_bg_display(self.scale_bg(predicted)),
                self.units_label()
            ));
        }

        if let Some(display) = self
            .property("iob")
            .and_then(|v| v.get("display"))
            .and_then(Value::as_str)
        {
            message.push_str(&format!("\nIOB: {}U", display));
        }

        if let Some(line) = self
            .property("bwp")
            .and_then(|v| v.get("displayLine"))
            .and_then(Value::as_str)
        {
            message.push('\n');
            message.push_str(line);
        }

        message
    }
}

/// 胰岛素显示取整（向下取整到泵的步长）
pub fn round_insulin(insulin: f64, rounding: InsulinRounding) -> String {
    if insulin == 0.0 {
        return "0".to_string();
    }
    let (step, digits) = match rounding {
        InsulinRounding::Generic => (0.01, 2),
        InsulinRounding::Medtronic if insulin <= 0.5 => (0.025, 3),
        InsulinRounding::Medtronic if insulin < 1.0 => (0.05, 2),
        InsulinRounding::Medtronic => (0.1, 1),
    };
    let floored = ((insulin / step) + 1e-9).floor() * step;
    format!("{:.*}", digits, floored)
}

/// 快照文件（`check` / `watch` 命令的输入）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotFile {
    /// 评估时间；缺省为当前时间
    pub time: Option<i64>,
    pub entries: Vec<Reading>,
    pub treatments: Vec<Treatment>,
    pub profile: Option<Profile>,
}

impl SnapshotFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))
    }

    pub fn into_sandbox(self, config: &Config, now: i64) -> Sandbox {
        let mut sandbox = Sandbox::new(self.time.unwrap_or(now))
            .with_readings(self.entries)
            .with_treatments(self.treatments)
            .with_thresholds(config.thresholds)
            .with_units(config.units)
            .with_insulin_rounding(config.insulin_rounding)
            .with_all_extended_settings(config.extended_settings.clone());

        if let Some(mut profile) = self.profile {
            if let Some(offset) = config.utc_offset_minutes {
                profile.utc_offset_minutes = offset;
            }
            sandbox = sandbox.with_profile(profile);
        }
        sandbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use serde_json::json;

    const T0: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    fn sandbox() -> Sandbox {
        Sandbox::new(T0).with_readings(vec![
            Reading::sensor(T0 - 5 * MINUTE, 140.0),
            Reading::meter(T0 - 2 * MINUTE, 150.0),
            Reading::sensor(T0, 150.0).with_direction(Direction::FortyFiveUp),
            Reading::sensor(T0 + 5 * MINUTE, 400.0),
        ])
    }

    #[test]
    fn test_readings_split_by_source_and_time() {
        let sbx = sandbox();
        assert_eq!(sbx.readings.len(), 3);
        assert_eq!(sbx.meter_readings.len(), 1);
        // 评估时间之后的读数被忽略
        assert_eq!(sbx.last_sgv(), Some(150.0));
        assert_eq!(sbx.last_sgv_mills(), Some(T0));
        assert_eq!(sbx.delta(), Some(10.0));
        assert_eq!(sbx.delta_display().as_deref(), Some("+10"));
    }

    #[test]
    fn test_mmol_scaling() {
        let sbx = sandbox().with_units(Units::Mmol);
        assert_eq!(sbx.last_scaled_sgv(), Some(8.3));
        assert_eq!(sbx.units_label(), "mmol/L");
        assert_eq!(sbx.delta_display().as_deref(), Some("+0.6"));
    }

    #[test]
    fn test_delta_requires_recent_previous_reading() {
        let sbx = Sandbox::new(T0).with_readings(vec![
            Reading::sensor(T0 - 30 * MINUTE, 100.0),
            Reading::sensor(T0, 120.0),
        ]);
        assert_eq!(sbx.delta(), None);
        assert_eq!(Sandbox::new(T0).delta(), None);
    }

    #[test]
    fn test_extended_settings_parse_strings() {
        let mut settings = PluginSettings::new();
        settings.insert("warn".to_string(), json!("0.75"));
        settings.insert("urgent".to_string(), json!(2));
        settings.insert("enableAlerts".to_string(), json!("on"));
        settings.insert("display".to_string(), json!("days"));
        let sbx = Sandbox::new(T0).with_extended_settings("bwp", settings);

        let ext = sbx.extended_settings("bwp");
        assert_eq!(ext.number("warn"), Some(0.75));
        assert_eq!(ext.number("urgent"), Some(2.0));
        assert_eq!(ext.flag("enableAlerts"), Some(true));
        assert_eq!(ext.string("display"), Some("days"));
        assert_eq!(ext.number("missing"), None);
        assert_eq!(sbx.extended_settings("other").number("warn"), None);
    }

    #[test]
    fn test_minutes_setting_is_bounded() {
        let mut settings = PluginSettings::new();
        settings.insert("snoozeMins".to_string(), json!(1e300));
        settings.insert("short".to_string(), json!("15"));
        settings.insert("negative".to_string(), json!(-5));
        settings.insert("nan".to_string(), json!("NaN"));
        let sbx = Sandbox::new(T0).with_extended_settings("treatmentnotify", settings);

        let ext = sbx.extended_settings("treatmentnotify");
        assert_eq!(ext.minutes_ms("snoozeMins"), Some(7 * 24 * 60 * ONE_MINUTE_MS));
        assert_eq!(ext.minutes_ms("short"), Some(15 * ONE_MINUTE_MS));
        assert_eq!(ext.minutes_ms("negative"), None);
        assert_eq!(ext.minutes_ms("nan"), None);
    }

    #[test]
    fn test_round_insulin() {
        assert_eq!(round_insulin(0.0, InsulinRounding::Generic), "0");
        assert_eq!(round_insulin(1.159, InsulinRounding::Generic), "1.15");
        assert_eq!(round_insulin(1.15, InsulinRounding::Generic), "1.15");
        assert_eq!(round_insulin(0.33, InsulinRounding::Medtronic), "0.325");
        assert_eq!(round_insulin(0.77, InsulinRounding::Medtronic), "0.75");
        assert_eq!(round_insulin(2.37, InsulinRounding::Medtronic), "2.3");
    }

    #[test]
    fn test_property_as_reports_shape_errors() {
        let mut sbx = Sandbox::new(T0);
        let mut staged = BTreeMap::new();
        staged.insert("iob".to_string(), json!({"iob": 1.5, "display": "1.50"}));
        sbx.commit_properties(staged);

        #[derive(Deserialize)]
        struct Iob {
            iob: f64,
        }
        let iob: Iob = sbx.property_as("iob").unwrap().unwrap();
        assert_eq!(iob.iob, 1.5);
        assert!(sbx.property_as::<Iob>("missing").unwrap().is_none());
        assert!(matches!(
            sbx.property_as::<Vec<u8>>("iob"),
            Err(PluginError::PropertyShape(..))
        ));
    }

    #[test]
    fn test_default_message() {
        let mut sbx = sandbox();
        assert_eq!(sbx.build_default_message(), "BG Now: 150 +10 ↗ mg/dl");

        let mut staged = BTreeMap::new();
        staged.insert("iob".to_string(), json!({"iob": 1.5, "display": "1.50"}));
        staged.insert("bwp".to_string(), json!({"displayLine": "BWP: 0.25U"}));
        sbx.commit_properties(staged);
        assert_eq!(
            sbx.build_default_message(),
            "BG Now: 150 +10 ↗ mg/dl\nIOB: 1.50U\nBWP: 0.25U"
        );
    }

    #[test]
    fn test_snapshot_file_into_sandbox() {
        let json = r#"{
            "time": 1700000000000,
            "entries": [
                {"date": 1700000000000, "sgv": 65, "direction": "Flat", "type": "sgv"},
                {"date": 1699999880000, "mbg": 70, "type": "mbg"}
            ],
            "treatments": [{"mills": 1699999000000, "eventType": "Site Change"}]
        }"#;
        let file: SnapshotFile = serde_json::from_str(json).unwrap();
        let sbx = file.into_sandbox(&Config::default(), 0);

        assert_eq!(sbx.time, T0);
        assert_eq!(sbx.last_sgv(), Some(65.0));
        assert_eq!(sbx.meter_readings.len(), 1);
        assert_eq!(sbx.site_change_treatments().count(), 1);
        assert_eq!(sbx.thresholds, Thresholds::default());
    }
}
