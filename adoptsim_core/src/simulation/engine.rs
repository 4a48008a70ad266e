//! Monte Carlo evaluation of a persona population against one scorecard.
//!
//! Personas and their executions are independent draws. Each persona gets
//! its own ChaCha8 stream per block of executions, derived from
//! (seed, persona index, block index), and blocks only return integer counts.
//! Counts are merged by addition, so the result is bit-identical no matter
//! how rayon schedules the work.

use adoptsim_env::{ScorecardId, ScorecardParams};
use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::gates::{Outcome, OutcomeModel, ThresholdGates};
use super::{
    AggregatedOutcomes, OutcomeDistribution, PersonaFailure, PersonaOutcome, RunResult, RunStatus,
    SimulationConfig, SimulationRun,
};
use crate::calibration::Calibration;
use crate::error::{ConfigError, SimError};
use crate::persona::{LatentTraits, Persona, TraitWeights};
use crate::scenario::Scenario;
use crate::scorecard::validate_params;

/// Executions sampled from one RNG stream.
const EXECUTION_BLOCK: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct OutcomeCounts {
    did_not_try: u64,
    failed: u64,
    success: u64,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::DidNotTry => self.did_not_try += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Success => self.success += 1,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            did_not_try: self.did_not_try + other.did_not_try,
            failed: self.failed + other.failed,
            success: self.success + other.success,
        }
    }
}

/// SplitMix64 finaliser, used to decorrelate derived stream seeds.
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

fn stream_seed(seed: u64, persona_index: u64, block: u64) -> u64 {
    splitmix64(seed ^ splitmix64(persona_index.wrapping_mul(0x517cc1b727220a95) ^ splitmix64(block)))
}

/// The Outcome Simulator.
#[derive(Clone)]
pub struct Simulator {
    model: Arc<dyn OutcomeModel>,

    /// Weights used to derive traits from observables at read time
    weights: TraitWeights,
}

impl Simulator {
    /// Simulator using the default threshold gates of the calibration.
    pub fn new(calibration: &Calibration) -> Self {
        Self {
            model: Arc::new(ThresholdGates::new(calibration.gates.clone())),
            weights: calibration.trait_weights.clone(),
        }
    }

    /// Simulator using a custom gate strategy.
    pub fn with_model(model: Arc<dyn OutcomeModel>, weights: TraitWeights) -> Self {
        Self { model, weights }
    }

    /// Name of the gate strategy in use.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Runs the Monte Carlo evaluation.
    ///
    /// Configuration problems (empty population, a persona without traits,
    /// invalid config or scorecard, invalid scenario) are rejected before any
    /// sampling. A persona whose traits are not finite is isolated into
    /// `failures`; the run is `failed` only when no persona could be evaluated.
    pub fn simulate(
        &self,
        personas: &[Persona],
        scorecard_id: ScorecardId,
        scorecard: &ScorecardParams,
        scenario: &Scenario,
        config: &SimulationConfig,
    ) -> Result<RunResult, SimError> {
        let traits = self.check_inputs(personas, scorecard, scenario, config)?;

        let seed = match config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                debug!("No seed configured, drew {} from entropy", seed);
                seed
            }
        };
        let effective_config = SimulationConfig {
            n_synths: personas.len(),
            seed: Some(seed),
            ..config.clone()
        };

        let clock = Instant::now();
        let mut run = SimulationRun::start(scorecard_id, &scenario.id, effective_config, Utc::now());

        let noise = Normal::new(0.0, config.sigma).map_err(|e| SimError::Sampling(e.to_string()))?;

        let evaluated: Vec<Result<OutcomeCounts, String>> = traits
            .par_iter()
            .enumerate()
            .map(|(index, traits)| self.evaluate_persona(index as u64, traits, scorecard, scenario, config.n_executions, &noise, seed))
            .collect();

        let n = config.n_executions as f64;
        let mut outcomes = Vec::with_capacity(personas.len());
        let mut failures = Vec::new();

        for ((persona, traits), result) in personas.iter().zip(&traits).zip(evaluated) {
            match result {
                Ok(counts) => outcomes.push(PersonaOutcome {
                    run_id: run.id,
                    persona_id: persona.id,
                    did_not_try_rate: counts.did_not_try as f64 / n,
                    failed_rate: counts.failed as f64 / n,
                    success_rate: counts.success as f64 / n,
                    traits: *traits,
                }),
                Err(reason) => {
                    warn!("Persona {} isolated from run {}: {}", persona.id, run.id, reason);
                    failures.push(PersonaFailure {
                        persona_id: persona.id,
                        reason,
                    });
                }
            }
        }

        run.total_synths = outcomes.len();
        run.aggregated_outcomes = aggregate(&outcomes);
        run.status = if outcomes.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.completed_at = Some(Utc::now());
        run.execution_time_seconds = clock.elapsed().as_secs_f64();

        let success_rates: Vec<f64> = outcomes.iter().map(|o| o.success_rate).collect();
        let success_distribution = OutcomeDistribution::from_rates(&success_rates);

        info!(
            "Run {} [{}] {:?}: success={:.3} failed={:.3} did_not_try={:.3} ({} personas, {} isolated, {:.3}s)",
            run.id,
            scenario.id,
            run.status,
            run.aggregated_outcomes.success,
            run.aggregated_outcomes.failed,
            run.aggregated_outcomes.did_not_try,
            outcomes.len(),
            failures.len(),
            run.execution_time_seconds,
        );

        Ok(RunResult {
            run,
            outcomes,
            failures,
            success_distribution,
        })
    }

    /// Evaluates one scorecard under several scenarios with the same config.
    pub fn compare_scenarios(
        &self,
        personas: &[Persona],
        scorecard_id: ScorecardId,
        scorecard: &ScorecardParams,
        scenarios: &[&Scenario],
        config: &SimulationConfig,
    ) -> Result<Vec<RunResult>, SimError> {
        // Pin the seed so every scenario sees the same random draws
        let config = SimulationConfig {
            seed: Some(config.seed.unwrap_or_else(rand::random::<u64>)),
            ..config.clone()
        };

        scenarios
            .iter()
            .map(|scenario| self.simulate(personas, scorecard_id, scorecard, scenario, &config))
            .collect()
    }

    fn check_inputs(
        &self,
        personas: &[Persona],
        scorecard: &ScorecardParams,
        scenario: &Scenario,
        config: &SimulationConfig,
    ) -> Result<Vec<LatentTraits>, ConfigError> {
        if personas.is_empty() {
            return Err(ConfigError::EmptyPopulation);
        }
        config.validate()?;
        if config.n_synths != 0 && config.n_synths != personas.len() {
            return Err(ConfigError::Invalid(format!(
                "n_synths is {} but the population has {} personas",
                config.n_synths,
                personas.len()
            )));
        }
        validate_params(scorecard)?;
        scenario.validate()?;

        // Observables are authoritative, a cached profile is only used without them
        personas
            .iter()
            .map(|p| match (&p.observables, p.traits) {
                (Some(observables), _) => Ok(self.weights.derive(observables)),
                (None, Some(traits)) => Ok(traits),
                (None, None) => Err(ConfigError::MissingTraits(p.id.to_string())),
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_persona(
        &self,
        persona_index: u64,
        traits: &LatentTraits,
        scorecard: &ScorecardParams,
        scenario: &Scenario,
        n_executions: usize,
        noise: &Normal<f64>,
        seed: u64,
    ) -> Result<OutcomeCounts, String> {
        if !traits.is_finite() {
            return Err(format!("non-finite trait profile {:?}", traits.as_array()));
        }

        let blocks = n_executions.div_ceil(EXECUTION_BLOCK);
        let counts = (0..blocks)
            .into_par_iter()
            .map(|block| {
                let mut rng = ChaCha8Rng::seed_from_u64(stream_seed(seed, persona_index, block as u64));
                let start = block * EXECUTION_BLOCK;
                let len = EXECUTION_BLOCK.min(n_executions - start);
                let base = traits.as_array();

                let mut counts = OutcomeCounts::default();
                for _ in 0..len {
                    // Always draw all four so streams stay aligned across scorecards
                    let mut sampled = [0.0; 4];
                    for (slot, mean) in sampled.iter_mut().zip(base) {
                        *slot = (mean + noise.sample(&mut rng)).clamp(0.0, 1.0);
                    }
                    let noisy = LatentTraits::from_array(sampled);
                    counts.record(self.model.classify(&noisy, scorecard, scenario));
                }
                counts
            })
            .reduce(OutcomeCounts::default, OutcomeCounts::merge);

        Ok(counts)
    }
}

fn aggregate(outcomes: &[PersonaOutcome]) -> AggregatedOutcomes {
    if outcomes.is_empty() {
        return AggregatedOutcomes::default();
    }
    let n = outcomes.len() as f64;
    AggregatedOutcomes {
        did_not_try: outcomes.iter().map(|o| o.did_not_try_rate).sum::<f64>() / n,
        failed: outcomes.iter().map(|o| o.failed_rate).sum::<f64>() / n,
        success: outcomes.iter().map(|o| o.success_rate).sum::<f64>() / n,
    }
}

/// Personas with identical traits.
#[cfg(test)]
pub(crate) fn uniform_population(n: usize, traits: LatentTraits) -> Vec<Persona> {
    (0..n)
        .map(|i| Persona::with_traits(adoptsim_env::PersonaId::from_seed(i as u64), traits))
        .collect()
}
