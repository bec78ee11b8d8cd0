//! AR2 short-horizon forecast
//!
//! Second order autoregressive model on `ln(bg / 140)`, stepped every 5 minutes.

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::model::{Reading, FIVE_MINUTES_MS, ONE_HOUR_MS, ONE_MINUTE_MS};
use crate::plugin::{Capabilities, Plugin, PluginType, PropertyScope};
use crate::sandbox::Sandbox;

const BG_REF: f64 = 140.0;
const BG_MIN: f64 = 36.0;
const BG_MAX: f64 = 400.0;
const COEFFICIENTS: [f64; 2] = [-0.723, 1.716];
const LOSS_REF: f64 = 120.0;
/// 预测最多 24 步（2 小时）
const MAX_STEPS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub mills: i64,
    pub sgv: f64,
}

/// `ar2` property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub predicted: Vec<ForecastPoint>,
    pub avg_loss: f64,
}

pub struct Ar2Plugin;

/// Forecast from readings sorted ascending; needs at least three readings
pub fn forecast(readings: &[Reading], now: i64) -> Option<Forecast> {
    let [.., _, previous, last] = readings else {
        return None;
    };

    let elapsed_mins = (last.mills - previous.mills) as f64 / ONE_MINUTE_MS as f64;
    let current = (last.sgv / BG_REF).ln();
    let mut y = if elapsed_mins < 5.1 {
        [(previous.sgv / BG_REF).ln(), current]
    } else {
        [current, current]
    };

    let age_hours = (now - last.mills) as f64 / ONE_HOUR_MS as f64;
    let steps = ((12.0 * (0.5 + age_hours)).ceil().max(0.0) as usize).min(MAX_STEPS);

    let mut predicted = Vec::with_capacity(steps + 1);
    let mut mills = last.mills;
    for _ in 0..=steps {
        y = [y[1], COEFFICIENTS[0] * y[0] + COEFFICIENTS[1] * y[1]];
        mills += FIVE_MINUTES_MS;
        let sgv = (BG_REF * y[1].exp()).round().clamp(BG_MIN, BG_MAX);
        predicted.push(ForecastPoint { mills, sgv });
    }

    let size = (predicted.len() - 1).min(6);
    let avg_loss = if size == 0 {
        0.0
    } else {
        predicted[..=size]
            .iter()
            .map(|p| (p.sgv / LOSS_REF).log10().powi(2) / size as f64)
            .sum()
    };

    Some(Forecast {
        predicted,
        avg_loss,
    })
}

impl Plugin for Ar2Plugin {
    fn name(&self) -> &'static str {
        "ar2"
    }

    fn label(&self) -> &'static str {
        "AR2"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Forecast
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROPERTY_PROVIDER
    }

    fn provides(&self) -> &'static [&'static str] {
        &["ar2"]
    }

    fn set_properties(&self, scope: &mut PropertyScope<'_>) -> Result<(), PluginError> {
        scope.offer_property("ar2", |sbx: &Sandbox| {
            let current: Vec<Reading> = sbx
                .readings
                .iter()
                .filter(|r| r.mills <= sbx.time)
                .cloned()
                .collect();
            Ok(forecast(&current, sbx.time))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn readings(values: &[f64]) -> Vec<Reading> {
        let start = T0 - FIVE_MINUTES_MS * (values.len() as i64 - 1);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::sensor(start + FIVE_MINUTES_MS * i as i64, *v))
            .collect()
    }

    #[test]
    fn test_needs_three_readings() {
        assert!(forecast(&readings(&[100.0, 110.0]), T0).is_none());
        assert!(forecast(&readings(&[100.0, 110.0, 120.0]), T0).is_some());
    }

    #[test]
    fn test_flat_trend_stays_flat() {
        let result = forecast(&readings(&[120.0, 120.0, 120.0]), T0).unwrap();
        // 当前数据：ceil(12 * 0.5) = 6，共 7 个点
        assert_eq!(result.predicted.len(), 7);
        assert_eq!(result.predicted[0].mills, T0 + FIVE_MINUTES_MS);
        assert!(result.predicted.iter().all(|p| (p.sgv - 120.0).abs() <= 3.0));
        assert!(result.avg_loss < 0.001);
    }

    #[test]
    fn test_rising_trend_keeps_rising_and_clamps() {
        let result = forecast(&readings(&[200.0, 280.0, 360.0]), T0).unwrap();
        assert!(result.predicted[0].sgv > 360.0);
        assert!(result.predicted.iter().all(|p| p.sgv <= BG_MAX));
        assert_eq!(result.predicted.last().unwrap().sgv, BG_MAX);
    }

    #[test]
    fn test_stale_data_extends_horizon() {
        let result = forecast(&readings(&[100.0, 105.0, 110.0]), T0 + ONE_HOUR_MS).unwrap();
        // ceil(12 * 1.5) = 18
        assert_eq!(result.predicted.len(), 19);
    }

    #[test]
    fn test_horizon_is_capped_for_ancient_readings() {
        let ancient: Vec<Reading> = [100.0, 105.0, 110.0]
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::sensor(FIVE_MINUTES_MS * i as i64, *v))
            .collect();
        let result = forecast(&ancient, T0).unwrap();
        assert_eq!(result.predicted.len(), MAX_STEPS + 1);
    }
}
