//! Display units and mg/dL ↔ mmol/L conversion.

use serde::{Deserialize, Serialize};

pub const MMOL_TO_MGDL: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    #[default]
    #[serde(rename = "mg/dl", alias = "mgdl")]
    MgDl,
    #[serde(rename = "mmol", alias = "mmol/L")]
    Mmol,
}

impl Units {
    pub fn label(&self) -> &'static str {
        match self {
            Units::MgDl => "mg/dl",
            Units::Mmol => "mmol/L",
        }
    }

    /// Convert a canonical mg/dL value to these units.
    pub fn scale(&self, mgdl: f64) -> f64 {
        match self {
            Units::MgDl => mgdl,
            Units::Mmol => mgdl_to_mmol(mgdl),
        }
    }

    /// Rounding used for display: one decimal for mmol, whole numbers for mg/dL.
    pub fn round_for_display(&self, value: f64) -> f64 {
        match self {
            Units::MgDl => value.round(),
            Units::Mmol => (value * 10.0).round() / 10.0,
        }
    }
}

pub fn mgdl_to_mmol(mgdl: f64) -> f64 {
    (mgdl / MMOL_TO_MGDL * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mgdl_to_mmol() {
        assert_eq!(mgdl_to_mmol(150.0), 8.3);
        assert_eq!(mgdl_to_mmol(180.0), 10.0);
    }

    #[test]
    fn test_scale_and_round() {
        assert_eq!(Units::MgDl.scale(150.0), 150.0);
        assert_eq!(Units::Mmol.scale(150.0), 8.3);
        assert_eq!(Units::Mmol.round_for_display(4.26), 4.3);
        assert_eq!(Units::MgDl.round_for_display(99.6), 100.0);
    }

    #[test]
    fn test_units_serde_labels() {
        let units: Units = serde_json::from_str("\"mmol\"").unwrap();
        assert_eq!(units, Units::Mmol);
        assert_eq!(serde_json::to_string(&Units::MgDl).unwrap(), "\"mg/dl\"");
    }
}
