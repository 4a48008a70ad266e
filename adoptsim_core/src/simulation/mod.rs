//! The Outcome Simulator (Monte Carlo engine) and its records.

mod engine;
mod gates;

pub(crate) use engine::splitmix64;
pub use engine::Simulator;
#[cfg(test)]
pub(crate) use engine::uniform_population;
pub use gates::{GateCalibration, Outcome, OutcomeModel, ThresholdGates};

use adoptsim_env::{PersonaId, RunId, ScorecardId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::persona::LatentTraits;

/// Tolerance on the per-persona rate sum.
pub const RATE_SUM_TOLERANCE: f64 = 1e-6;

/// Simulation parameters; immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Population size (0 = take it from the supplied population)
    pub n_synths: usize,

    /// Executions per persona
    pub n_executions: usize,

    /// Standard deviation of the per-execution trait noise
    pub sigma: f64,

    /// Master seed; `None` draws from process entropy
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_synths: 0,
            n_executions: 100,
            sigma: 0.1,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Config with a fixed seed.
    pub fn seeded(n_executions: usize, sigma: f64, seed: u64) -> Self {
        Self {
            n_synths: 0,
            n_executions,
            sigma,
            seed: Some(seed),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_executions == 0 {
            return Err(ConfigError::NoExecutions);
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(ConfigError::InvalidSigma(self.sigma));
        }
        Ok(())
    }
}

/// Lifecycle of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Population-level rates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedOutcomes {
    pub did_not_try: f64,
    pub failed: f64,
    pub success: f64,
}

/// One evaluation of (scorecard, scenario, population, config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub id: RunId,
    pub scorecard_id: ScorecardId,
    pub scenario_id: String,
    pub config: SimulationConfig,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_synths: usize,
    pub aggregated_outcomes: AggregatedOutcomes,
    pub execution_time_seconds: f64,
}

impl SimulationRun {
    /// Opens a run in the `running` state.
    pub fn start(scorecard_id: ScorecardId, scenario_id: &str, config: SimulationConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            id: RunId::new(),
            scorecard_id,
            scenario_id: scenario_id.to_string(),
            config,
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            total_synths: 0,
            aggregated_outcomes: AggregatedOutcomes::default(),
            execution_time_seconds: 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }
}

/// Per-persona aggregate over all executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaOutcome {
    pub run_id: RunId,
    pub persona_id: PersonaId,
    pub did_not_try_rate: f64,
    pub failed_rate: f64,
    pub success_rate: f64,

    /// Trait profile the persona was simulated with
    pub traits: LatentTraits,
}

impl PersonaOutcome {
    pub fn rate_sum(&self) -> f64 {
        self.did_not_try_rate + self.failed_rate + self.success_rate
    }
}

/// A persona whose evaluation was isolated from the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaFailure {
    pub persona_id: PersonaId,
    pub reason: String,
}

/// Summary statistics over per-persona success rates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutcomeDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub p10: f64,
    pub median: f64,
    pub p90: f64,
    pub max: f64,
}

impl OutcomeDistribution {
    /// Nearest-rank percentiles, population standard deviation.
    pub fn from_rates(rates: &[f64]) -> Self {
        if rates.is_empty() {
            return Self::default();
        }

        let mut sorted = rates.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

        let percentile = |p: f64| {
            let rank = (p * n).ceil().max(1.0) as usize;
            sorted[rank.min(sorted.len()) - 1]
        };

        Self {
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            p10: percentile(0.10),
            median: percentile(0.50),
            p90: percentile(0.90),
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Everything one call to the simulator produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run: SimulationRun,
    pub outcomes: Vec<PersonaOutcome>,
    pub failures: Vec<PersonaFailure>,
    pub success_distribution: OutcomeDistribution,
}

impl RunResult {
    pub fn success_rate(&self) -> f64 {
        self.run.aggregated_outcomes.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_config_validation() {
        assert!(SimulationConfig::default().validate().is_ok());

        let no_runs = SimulationConfig {
            n_executions: 0,
            ..Default::default()
        };
        assert_eq!(no_runs.validate(), Err(ConfigError::NoExecutions));

        let flat = SimulationConfig {
            sigma: 0.0,
            ..Default::default()
        };
        assert_eq!(flat.validate(), Err(ConfigError::InvalidSigma(0.0)));

        let nan = SimulationConfig {
            sigma: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_distribution() {
        let rates: Vec<f64> = (1..=10).map(|i| i as f64 / 10.0).collect();
        let dist = OutcomeDistribution::from_rates(&rates);

        assert_relative_eq!(dist.mean, 0.55, epsilon = 1e-12);
        assert_eq!(dist.min, 0.1);
        assert_eq!(dist.p10, 0.1);
        assert_eq!(dist.median, 0.5);
        assert_eq!(dist.p90, 0.9);
        assert_eq!(dist.max, 1.0);
        assert!(dist.std_dev > 0.28 && dist.std_dev < 0.29);
    }

    #[test]
    fn test_distribution_empty() {
        assert_eq!(OutcomeDistribution::from_rates(&[]), OutcomeDistribution::default());
    }
}
