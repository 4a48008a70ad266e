//! Attempt and success gates.
//!
//! The gates turn one noisy trait sample into a three-way outcome. Their
//! functional form is a calibration choice, so it sits behind the
//! [`OutcomeModel`] trait; [`ThresholdGates`] is the default linear model.

use adoptsim_env::ScorecardParams;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::persona::LatentTraits;
use crate::scenario::Scenario;

/// Classification of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    DidNotTry,
    Failed,
    Success,
}

/// Strategy deciding whether a persona tries the feature and whether it succeeds.
///
/// Implementations must be monotone in the scorecard: raising any burden
/// dimension may never turn a failure into a success.
pub trait OutcomeModel: Send + Sync {
    /// Attempt gate.
    fn attempts(&self, traits: &LatentTraits, scorecard: &ScorecardParams, scenario: &Scenario) -> bool;

    /// Success gate, only consulted after an attempt.
    fn succeeds(&self, traits: &LatentTraits, scorecard: &ScorecardParams, scenario: &Scenario) -> bool;

    /// Returns the name of this model.
    fn name(&self) -> &str;

    /// Runs both gates.
    fn classify(&self, traits: &LatentTraits, scorecard: &ScorecardParams, scenario: &Scenario) -> Outcome {
        if !self.attempts(traits, scorecard, scenario) {
            Outcome::DidNotTry
        } else if self.succeeds(traits, scorecard, scenario) {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }
}

/// Coefficients of the default gates.
///
/// ```text
/// drive    = w_e·exploration + w_t·trust + g_m·scenario.motivation + g_t·scenario.trust
/// barrier  = (w_r·perceived_risk + w_f·initial_effort)·(1 + g_f·scenario.friction)
/// attempt  ⇔ drive − barrier ≥ attempt_threshold
///
/// ability  = w_c·capability + w_ft·friction_tolerance
/// cost     = w_x·complexity + w_v·time_to_value
/// bar      = cost·(criticality_floor + g_c·scenario.task_criticality)
/// success  ⇔ ability ≥ bar
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCalibration {
    pub exploration_weight: f64,
    pub trust_weight: f64,
    pub motivation_gain: f64,
    pub trust_gain: f64,
    pub risk_weight: f64,
    pub effort_weight: f64,
    pub friction_gain: f64,
    pub attempt_threshold: f64,

    pub capability_weight: f64,
    pub tolerance_weight: f64,
    pub complexity_weight: f64,
    pub time_to_value_weight: f64,
    pub criticality_floor: f64,
    pub criticality_gain: f64,
}

impl Default for GateCalibration {
    fn default() -> Self {
        Self {
            exploration_weight: 0.5,
            trust_weight: 0.5,
            motivation_gain: 0.25,
            trust_gain: 0.15,
            risk_weight: 0.5,
            effort_weight: 0.5,
            friction_gain: 0.5,
            attempt_threshold: 0.0,

            capability_weight: 0.6,
            tolerance_weight: 0.4,
            complexity_weight: 0.6,
            time_to_value_weight: 0.4,
            criticality_floor: 0.5,
            criticality_gain: 1.0,
        }
    }
}

impl GateCalibration {
    /// Rejects coefficients that would break monotonicity in the scorecard.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = [
            ("exploration_weight", self.exploration_weight),
            ("trust_weight", self.trust_weight),
            ("motivation_gain", self.motivation_gain),
            ("trust_gain", self.trust_gain),
            ("risk_weight", self.risk_weight),
            ("effort_weight", self.effort_weight),
            ("capability_weight", self.capability_weight),
            ("tolerance_weight", self.tolerance_weight),
            ("complexity_weight", self.complexity_weight),
            ("time_to_value_weight", self.time_to_value_weight),
            ("criticality_gain", self.criticality_gain),
        ];
        for (name, value) in non_negative {
            ConfigError::check_range(name, value, 0.0, f64::MAX)?;
        }

        // Friction multiplier (1 + g_f·friction) must stay positive for friction in [-1, 1]
        ConfigError::check_range("friction_gain", self.friction_gain, 0.0, 0.99)?;
        ConfigError::check_range("criticality_floor", self.criticality_floor, f64::MIN_POSITIVE, f64::MAX)?;
        ConfigError::check_range("attempt_threshold", self.attempt_threshold, -2.0, 2.0)?;
        Ok(())
    }
}

/// Default linear threshold gates.
#[derive(Debug, Clone, Default)]
pub struct ThresholdGates {
    calibration: GateCalibration,
}

impl ThresholdGates {
    pub fn new(calibration: GateCalibration) -> Self {
        Self { calibration }
    }

    /// Attempt margin (drive minus barrier); positive leans towards trying.
    pub fn attempt_margin(&self, traits: &LatentTraits, scorecard: &ScorecardParams, scenario: &Scenario) -> f64 {
        let c = &self.calibration;
        let drive = c.exploration_weight * traits.exploration_prob
            + c.trust_weight * traits.trust_mean
            + c.motivation_gain * scenario.motivation
            + c.trust_gain * scenario.trust;
        let barrier = (c.risk_weight * scorecard.perceived_risk + c.effort_weight * scorecard.initial_effort)
            * (1.0 + c.friction_gain * scenario.friction);
        drive - barrier
    }

    /// Success margin (ability minus bar); non-negative means success.
    pub fn success_margin(&self, traits: &LatentTraits, scorecard: &ScorecardParams, scenario: &Scenario) -> f64 {
        let c = &self.calibration;
        let ability = c.capability_weight * traits.capability_mean
            + c.tolerance_weight * traits.friction_tolerance_mean;
        let cost = c.complexity_weight * scorecard.complexity + c.time_to_value_weight * scorecard.time_to_value;
        let bar = cost * (c.criticality_floor + c.criticality_gain * scenario.task_criticality);
        ability - bar
    }
}

impl OutcomeModel for ThresholdGates {
    fn attempts(&self, traits: &LatentTraits, scorecard: &ScorecardParams, scenario: &Scenario) -> bool {
        self.attempt_margin(traits, scorecard, scenario) >= self.calibration.attempt_threshold
    }

    fn succeeds(&self, traits: &LatentTraits, scorecard: &ScorecardParams, scenario: &Scenario) -> bool {
        self.success_margin(traits, scorecard, scenario) >= 0.0
    }

    fn name(&self) -> &str {
        "ThresholdGates"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral() -> Scenario {
        Scenario::new("neutral", 0.0, 0.0, 0.0, 0.5)
    }

    #[test]
    fn test_capable_persona_succeeds_on_easy_feature() {
        let gates = ThresholdGates::default();
        let outcome = gates.classify(&LatentTraits::uniform(0.9), &ScorecardParams::uniform(0.1), &neutral());
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn test_wary_persona_does_not_try_risky_feature() {
        let gates = ThresholdGates::default();
        let outcome = gates.classify(&LatentTraits::uniform(0.1), &ScorecardParams::uniform(0.9), &neutral());
        assert_eq!(outcome, Outcome::DidNotTry);
    }

    #[test]
    fn test_curious_but_unskilled_persona_fails() {
        let gates = ThresholdGates::default();
        let traits = LatentTraits {
            capability_mean: 0.1,
            trust_mean: 0.9,
            friction_tolerance_mean: 0.1,
            exploration_prob: 0.9,
        };
        let scorecard = ScorecardParams::new(0.9, 0.2, 0.2, 0.9);
        assert_eq!(gates.classify(&traits, &scorecard, &neutral()), Outcome::Failed);
    }

    #[test]
    fn test_criticality_raises_the_bar() {
        let gates = ThresholdGates::default();
        let traits = LatentTraits::uniform(0.5);
        let scorecard = ScorecardParams::uniform(0.5);

        let relaxed = Scenario::new("relaxed", 0.0, 0.0, 0.0, 0.0);
        let critical = Scenario::new("critical", 0.0, 0.0, 0.0, 1.0);

        assert!(gates.success_margin(&traits, &scorecard, &relaxed) > gates.success_margin(&traits, &scorecard, &critical));
    }

    #[test]
    fn test_friction_amplifies_barrier() {
        let gates = ThresholdGates::default();
        let traits = LatentTraits::uniform(0.5);
        let scorecard = ScorecardParams::uniform(0.5);

        let smooth = Scenario::new("smooth", 0.0, 0.0, -1.0, 0.5);
        let rough = Scenario::new("rough", 0.0, 0.0, 1.0, 0.5);

        assert!(gates.attempt_margin(&traits, &scorecard, &smooth) > gates.attempt_margin(&traits, &scorecard, &rough));
    }

    #[test]
    fn test_margins_are_monotone_in_burden() {
        let gates = ThresholdGates::default();
        let traits = LatentTraits::uniform(0.5);
        let scenario = neutral();

        let mut previous = f64::INFINITY;
        for step in 0..=10 {
            let complexity = step as f64 / 10.0;
            let margin = gates.success_margin(&traits, &ScorecardParams::new(complexity, 0.5, 0.5, 0.5), &scenario);
            assert!(margin <= previous);
            previous = margin;
        }
    }

    #[test]
    fn test_calibration_validation() {
        assert!(GateCalibration::default().validate().is_ok());

        let negative = GateCalibration {
            complexity_weight: -0.1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let runaway_friction = GateCalibration {
            friction_gain: 1.5,
            ..Default::default()
        };
        assert!(runaway_friction.validate().is_err());
    }
}
