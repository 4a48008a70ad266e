//! Drill runner - executes exploration drills against the in-memory store.
//!
//! Every drill builds a fresh world from its seed (virtual context, synthetic
//! population, proposer stack), runs one exploration to the end and then
//! checks the invariants every exploration must hold:
//!
//! - it terminated (`completed` or `exhausted`)
//! - the tree is well formed (one root, `depth = parent.depth + 1`, every
//!   ancestor walk reaches the root)
//! - at most one winner, and a winner exactly when completed
//! - budgets were respected
//!
//! plus the drill's own expectation.

use crate::context::VirtualContext;
use crate::drills::DrillId;
use crate::exporter::ExplorationExport;
use crate::population::SyntheticPopulation;
use crate::proposers::{ChaosConfig, ChaosProposer, ChaosStats, HeuristicProposer};

use adoptsim_core::{
    Calibration, Collaborators, ConfigError, Exploration, ExplorationConfig, ExplorationEngine, ExplorationError,
    ExplorationRequest, ExplorationStatus, ExplorationStore, MemoryExplorationStore, NodeStatus, ScenarioTable,
    SimulationConfig, Simulator, StoreError,
};
use adoptsim_env::{ActionProposer, AdoptsimContext, ScorecardParams};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a drill before its checks can run.
#[derive(Debug, Error)]
pub enum DrillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Exploration error: {0}")]
    Exploration(#[from] ExplorationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Results from running a drill.
#[derive(Debug, Clone, Serialize)]
pub struct DrillResult {
    /// Drill that was run
    pub drill: DrillId,

    /// Seed used
    pub seed: u64,

    /// Whether the drill passed all checks
    pub passed: bool,

    /// Final exploration status, if the exploration ran
    pub status: Option<ExplorationStatus>,

    pub total_nodes: u32,
    pub total_external_calls: u32,
    pub best_success_rate: f64,

    /// Virtual time spent, mostly proposer latency
    pub virtual_time: Duration,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Faults injected by the chaos proposer
    pub faults: ChaosStats,
}

impl DrillResult {
    fn errored(drill: DrillId, seed: u64, error: DrillError) -> Self {
        Self {
            drill,
            seed,
            passed: false,
            status: None,
            total_nodes: 0,
            total_external_calls: 0,
            best_success_rate: 0.0,
            virtual_time: Duration::ZERO,
            failure_reason: Some(error.to_string()),
            faults: ChaosStats::default(),
        }
    }
}

/// Everything a drill fixes before the exploration starts.
struct DrillPlan {
    scorecard: ScorecardParams,
    goal: f64,
    config: ExplorationConfig,
    chaos: Option<ChaosConfig>,
}

/// Runs exploration drills.
pub struct DrillRunner {
    /// Configuration seed
    seed: u64,

    /// Synthetic population size
    personas: usize,

    /// Executions per persona per node
    executions: usize,

    calibration: Calibration,
    scenarios: ScenarioTable,
}

impl DrillRunner {
    /// Creates a new drill runner.
    pub fn new(seed: u64, personas: usize) -> Self {
        Self {
            seed,
            personas,
            executions: 100,
            calibration: Calibration::default(),
            scenarios: ScenarioTable::builtin(),
        }
    }

    /// Sets the executions per persona.
    pub fn with_executions(mut self, executions: usize) -> Self {
        self.executions = executions;
        self
    }

    /// Runs a drill and returns the result.
    pub async fn run(&self, drill: DrillId) -> DrillResult {
        match self.execute(drill).await {
            Ok((result, _)) => result,
            Err(e) => {
                warn!("Drill {} (seed={}) aborted: {}", drill, self.seed, e);
                DrillResult::errored(drill, self.seed, e)
            }
        }
    }

    /// Runs a drill and exports the resulting tree.
    pub async fn run_with_export(&self, drill: DrillId) -> Result<(DrillResult, ExplorationExport), DrillError> {
        self.execute(drill).await
    }

    fn plan(&self, drill: DrillId) -> DrillPlan {
        let config = ExplorationConfig {
            max_depth: 5,
            max_children_per_node: 3,
            max_total_nodes: 30,
            max_external_calls: 40,
            min_improvement: 0.01,
            proposal_timeout_ms: 1_000,
            scenario_id: "baseline".to_string(),
            simulation: SimulationConfig {
                n_executions: self.executions,
                sigma: 0.1,
                ..Default::default()
            },
        };

        match drill {
            DrillId::SteadyClimb => DrillPlan {
                scorecard: ScorecardParams::new(0.7, 0.6, 0.6, 0.5),
                goal: 0.95,
                config,
                chaos: None,
            },
            DrillId::InstantWin => DrillPlan {
                scorecard: ScorecardParams::uniform(0.5),
                goal: 0.0,
                config,
                chaos: None,
            },
            DrillId::UnreachableGoal => DrillPlan {
                scorecard: ScorecardParams::uniform(0.8),
                goal: 1.0,
                config: ExplorationConfig { max_depth: 4, ..config },
                chaos: None,
            },
            DrillId::FlakyProposer => DrillPlan {
                scorecard: ScorecardParams::new(0.7, 0.6, 0.6, 0.5),
                goal: 0.9,
                config: ExplorationConfig {
                    max_total_nodes: 15,
                    ..config
                },
                chaos: Some(ChaosConfig {
                    failure_rate: 0.3,
                    malformed_rate: 0.2,
                    ..Default::default()
                }),
            },
            DrillId::SlowProposer => DrillPlan {
                scorecard: ScorecardParams::new(0.7, 0.6, 0.6, 0.5),
                goal: 0.9,
                config: ExplorationConfig {
                    max_total_nodes: 10,
                    proposal_timeout_ms: 20,
                    ..config
                },
                chaos: Some(ChaosConfig {
                    slow_rate: 0.5,
                    slow_delay: Duration::from_millis(200),
                    ..Default::default()
                }),
            },
            DrillId::MalformedFlood => DrillPlan {
                scorecard: ScorecardParams::uniform(0.6),
                goal: 0.95,
                config,
                chaos: Some(ChaosConfig {
                    malformed_rate: 1.0,
                    ..Default::default()
                }),
            },
        }
    }

    async fn execute(&self, drill: DrillId) -> Result<(DrillResult, ExplorationExport), DrillError> {
        info!("Starting drill: {} (seed={})", drill.name(), self.seed);
        if drill.injects_faults() {
            debug!("{}", drill.description());
        }

        let plan = self.plan(drill);
        let ctx = VirtualContext::shared(self.seed);
        let store = Arc::new(MemoryExplorationStore::new());
        let population =
            SyntheticPopulation::with_weights(ctx.seed(), self.calibration.trait_weights.clone()).personas(self.personas)?;

        let heuristic: Arc<dyn ActionProposer> = Arc::new(HeuristicProposer::default());
        let chaos = plan
            .chaos
            .clone()
            .map(|config| Arc::new(ChaosProposer::new(ctx.clone(), heuristic.clone(), config)));
        let proposer: Arc<dyn ActionProposer> = match &chaos {
            Some(chaos) => chaos.clone() as Arc<dyn ActionProposer>,
            None => heuristic,
        };

        let collaborators = Collaborators {
            ctx: ctx.clone(),
            proposer,
            store: store.clone(),
            simulator: Simulator::new(&self.calibration),
            population: population.into(),
        };

        let mut engine = ExplorationEngine::start(
            collaborators,
            &self.scenarios,
            ExplorationRequest::new(plan.scorecard, plan.goal, plan.config.clone()).with_population_seed(ctx.seed()),
        )?;
        let exploration = engine.run().await?;

        let faults = chaos.map(|c| c.stats()).unwrap_or_default();
        let failure = check_invariants(store.as_ref(), &exploration)
            .err()
            .or_else(|| check_expectation(drill, store.as_ref(), &exploration, &faults).err());

        let result = DrillResult {
            drill,
            seed: self.seed,
            passed: failure.is_none(),
            status: Some(exploration.status),
            total_nodes: exploration.total_nodes,
            total_external_calls: exploration.total_external_calls,
            best_success_rate: exploration.best_success_rate,
            virtual_time: ctx.now(),
            failure_reason: failure,
            faults,
        };

        if result.passed {
            info!(
                "✓ {} complete: {:?}, {} nodes, {} calls, best={:.3}",
                drill.name(),
                exploration.status,
                exploration.total_nodes,
                exploration.total_external_calls,
                exploration.best_success_rate
            );
        }

        let export = ExplorationExport::from_store(store.as_ref(), exploration.id)?;
        Ok((result, export))
    }
}

/// Checks that hold for every finished exploration.
fn check_invariants(store: &dyn ExplorationStore, exploration: &Exploration) -> Result<(), String> {
    let id = exploration.id;
    let nodes = store.list_nodes(id).map_err(|e| e.to_string())?;

    if exploration.is_running() {
        return Err("exploration did not terminate".to_string());
    }
    if nodes.len() != exploration.total_nodes as usize {
        return Err(format!(
            "{} nodes persisted but {} counted",
            nodes.len(),
            exploration.total_nodes
        ));
    }
    if exploration.total_nodes > exploration.config.max_total_nodes
        || exploration.total_external_calls > exploration.config.max_external_calls
    {
        return Err(format!(
            "budget overrun: {} nodes, {} calls",
            exploration.total_nodes, exploration.total_external_calls
        ));
    }

    let roots = nodes.iter().filter(|n| n.is_root()).count();
    if roots != 1 {
        return Err(format!("{} roots", roots));
    }

    for node in &nodes {
        if node.depth > exploration.config.max_depth {
            return Err(format!("node {} deeper than max_depth", node.id));
        }
        let path = store.ancestor_path(node.id).map_err(|e| e.to_string())?;
        if path.first().map(|n| n.depth) != Some(0) {
            return Err(format!("walk from {} does not reach the root", node.id));
        }
        for pair in path.windows(2) {
            if pair[1].depth != pair[0].depth + 1 || pair[1].parent_id != Some(pair[0].id) {
                return Err(format!("broken parent link at node {}", pair[1].id));
            }
        }
    }

    let winners = nodes.iter().filter(|n| n.node_status == NodeStatus::Winner).count();
    let completed = exploration.status == ExplorationStatus::Completed;
    match (winners, completed) {
        (0, false) | (1, true) => Ok(()),
        (w, _) => Err(format!("{} winners in a {:?} exploration", w, exploration.status)),
    }
}

/// The drill's own expectation.
fn check_expectation(
    drill: DrillId,
    store: &dyn ExplorationStore,
    exploration: &Exploration,
    faults: &ChaosStats,
) -> Result<(), String> {
    let nodes = store.list_nodes(exploration.id).map_err(|e| e.to_string())?;
    let unsimulated = nodes.iter().filter(|n| n.simulation_results.is_none()).count() as u64;

    match drill {
        DrillId::SteadyClimb => {
            let root = nodes
                .iter()
                .find(|n| n.is_root())
                .and_then(|n| n.success_rate())
                .unwrap_or(0.0);
            if exploration.best_success_rate <= root {
                return Err(format!(
                    "no improvement over the baseline ({:.3})",
                    root
                ));
            }
        }
        DrillId::InstantWin => {
            if exploration.status != ExplorationStatus::Completed || exploration.total_nodes != 1 {
                return Err(format!(
                    "expected an immediate win, got {:?} with {} nodes",
                    exploration.status, exploration.total_nodes
                ));
            }
        }
        DrillId::UnreachableGoal => {
            if exploration.status != ExplorationStatus::Exhausted {
                return Err(format!("expected exhaustion, got {:?}", exploration.status));
            }
        }
        DrillId::FlakyProposer | DrillId::SlowProposer => {
            // Every injected fault is a node with no simulation
            let expected = if drill == DrillId::SlowProposer {
                faults.slow
            } else {
                faults.failures + faults.malformed
            };
            if unsimulated != expected {
                return Err(format!("{} faults injected but {} unsimulated nodes", expected, unsimulated));
            }
            if nodes
                .iter()
                .any(|n| n.simulation_results.is_none() && n.node_status != NodeStatus::Dominated)
            {
                return Err("a failed proposal left an undominated node".to_string());
            }
        }
        DrillId::MalformedFlood => {
            let root_active = nodes
                .iter()
                .any(|n| n.is_root() && n.node_status == NodeStatus::Active);
            let expected_nodes = 1 + exploration.config.max_children_per_node;
            if exploration.status != ExplorationStatus::Exhausted
                || !root_active
                || exploration.total_nodes != expected_nodes
            {
                return Err(format!(
                    "expected {} nodes with an active root, got {} ({:?})",
                    expected_nodes, exploration.total_nodes, exploration.status
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_instant_win_drill() {
        let result = DrillRunner::new(1, 20).with_executions(50).run(DrillId::InstantWin).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_nodes, 1);
        assert_eq!(result.total_external_calls, 0);
    }

    #[tokio::test]
    async fn test_malformed_flood_drill() {
        let (result, export) = DrillRunner::new(2, 20)
            .with_executions(50)
            .run_with_export(DrillId::MalformedFlood)
            .await
            .unwrap();
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.faults.malformed, 3);
        assert_eq!(result.status, Some(ExplorationStatus::Exhausted));

        // Only the root was simulated
        assert_eq!(export.nodes.len(), 4);
        assert_eq!(export.runs.len(), 1);
        assert_eq!(export.counts.dominated, 3);

        // The drill seed regenerates the simulated population
        let record = export.exploration.population;
        assert_eq!(record.seed, Some(2));
        assert_eq!(record.size, 20);
        assert!(record.matches(&SyntheticPopulation::generate(2, 20).unwrap()));
    }

    #[tokio::test]
    async fn test_same_seed_same_drill() {
        let runner = DrillRunner::new(11, 30).with_executions(50);
        let a = runner.run(DrillId::FlakyProposer).await;
        let b = runner.run(DrillId::FlakyProposer).await;

        assert_eq!(a.total_nodes, b.total_nodes);
        assert_eq!(a.faults, b.faults);
        assert_eq!(a.best_success_rate, b.best_success_rate);
        assert_eq!(a.virtual_time, b.virtual_time);
    }
}
