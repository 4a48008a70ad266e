//! Feature scorecards.
//!
//! The numeric core only reads the four scores; uncertainty bands and
//! traceability metadata travel alongside for consumers.

use adoptsim_env::{ScorecardId, ScorecardParams};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One scorecard dimension with its uncertainty band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Point estimate in [0, 1]
    pub score: f64,

    /// Lower edge of the uncertainty band
    pub min: f64,

    /// Upper edge of the uncertainty band
    pub max: f64,

    /// Why the score was chosen
    #[serde(default)]
    pub rationale: String,

    /// Where the evidence came from
    #[serde(default)]
    pub sources: Vec<String>,
}

impl DimensionScore {
    /// A score with a degenerate band.
    pub fn exact(score: f64) -> Self {
        Self {
            score,
            min: score,
            max: score,
            rationale: String::new(),
            sources: Vec::new(),
        }
    }

    /// A score with a symmetric band, clipped to [0, 1].
    pub fn with_band(score: f64, half_width: f64) -> Self {
        Self {
            score,
            min: (score - half_width).max(0.0),
            max: (score + half_width).min(1.0),
            rationale: String::new(),
            sources: Vec::new(),
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        ConfigError::check_range(field, self.score, 0.0, 1.0)?;
        ConfigError::check_range(&format!("{}.min", field), self.min, 0.0, self.score)?;
        ConfigError::check_range(&format!("{}.max", field), self.max, self.score, 1.0)?;
        Ok(())
    }
}

/// A feature design described by its burden dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub id: ScorecardId,
    pub feature_name: String,
    pub complexity: DimensionScore,
    pub initial_effort: DimensionScore,
    pub perceived_risk: DimensionScore,
    pub time_to_value: DimensionScore,
}

impl Scorecard {
    /// Builds a scorecard with exact scores.
    pub fn from_params(feature_name: &str, params: ScorecardParams) -> Self {
        Self {
            id: ScorecardId::new(),
            feature_name: feature_name.to_string(),
            complexity: DimensionScore::exact(params.complexity),
            initial_effort: DimensionScore::exact(params.initial_effort),
            perceived_risk: DimensionScore::exact(params.perceived_risk),
            time_to_value: DimensionScore::exact(params.time_to_value),
        }
    }

    /// The numeric view consumed by the simulator.
    pub fn params(&self) -> ScorecardParams {
        ScorecardParams::new(
            self.complexity.score,
            self.initial_effort.score,
            self.perceived_risk.score,
            self.time_to_value.score,
        )
    }

    /// Optimistic corner of the uncertainty box (every burden at its minimum).
    pub fn optimistic(&self) -> ScorecardParams {
        ScorecardParams::new(
            self.complexity.min,
            self.initial_effort.min,
            self.perceived_risk.min,
            self.time_to_value.min,
        )
    }

    /// Pessimistic corner of the uncertainty box (every burden at its maximum).
    pub fn pessimistic(&self) -> ScorecardParams {
        ScorecardParams::new(
            self.complexity.max,
            self.initial_effort.max,
            self.perceived_risk.max,
            self.time_to_value.max,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.complexity.validate("complexity")?;
        self.initial_effort.validate("initial_effort")?;
        self.perceived_risk.validate("perceived_risk")?;
        self.time_to_value.validate("time_to_value")?;
        Ok(())
    }
}

/// Range check of the numeric view.
pub fn validate_params(params: &ScorecardParams) -> Result<(), ConfigError> {
    ConfigError::check_range("complexity", params.complexity, 0.0, 1.0)?;
    ConfigError::check_range("initial_effort", params.initial_effort, 0.0, 1.0)?;
    ConfigError::check_range("perceived_risk", params.perceived_risk, 0.0, 1.0)?;
    ConfigError::check_range("time_to_value", params.time_to_value, 0.0, 1.0)?;
    Ok(())
}
