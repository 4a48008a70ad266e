//! Immutable model configuration.
//!
//! Derivation weights and gate coefficients are loaded once into a
//! [`Calibration`] and passed explicitly to every engine.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::persona::TraitWeights;
use crate::simulation::GateCalibration;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default)]
    pub trait_weights: TraitWeights,

    #[serde(default)]
    pub gates: GateCalibration,
}

impl Calibration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Rebuilding runs the weight checks
        TraitWeights::new(self.trait_weights.direct(), self.trait_weights.complement())?;
        self.gates.validate()
    }

    /// Parses and validates a JSON calibration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let calibration: Calibration = serde_json::from_str(json)
            .map_err(|e| ConfigError::Invalid(format!("calibration file: {}", e)))?;
        calibration.validate()?;
        Ok(calibration)
    }

    /// Loads a calibration file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Invalid(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Calibration::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let calibration = Calibration::from_json(r#"{"gates": {
            "exploration_weight": 0.4, "trust_weight": 0.6, "motivation_gain": 0.25,
            "trust_gain": 0.15, "risk_weight": 0.5, "effort_weight": 0.5,
            "friction_gain": 0.5, "attempt_threshold": 0.1, "capability_weight": 0.6,
            "tolerance_weight": 0.4, "complexity_weight": 0.6, "time_to_value_weight": 0.4,
            "criticality_floor": 0.5, "criticality_gain": 1.0
        }}"#)
        .unwrap();

        assert_eq!(calibration.trait_weights, TraitWeights::default());
        assert_eq!(calibration.gates.attempt_threshold, 0.1);
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(Calibration::from_json("{not json").is_err());
    }

    #[test]
    fn test_roundtrip_through_json() {
        let json = serde_json::to_string(&Calibration::default()).unwrap();
        let parsed = Calibration::from_json(&json).unwrap();
        for (a, b) in parsed.trait_weights.row_sums().iter().zip(Calibration::default().trait_weights.row_sums()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
