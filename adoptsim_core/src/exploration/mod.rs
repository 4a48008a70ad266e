//! Scenario Exploration Search.
//!
//! An exploration grows a tree of scorecard variants rooted at a baseline.
//! Each node holds the scorecard it describes, the action that produced it
//! and the outcome of simulating it.
//!
//! ```text
//!                 root (depth 0, baseline)
//!                /            \
//!        "shorter setup"   "clearer pricing"      depth 1
//!          /      \              |
//!        ...     ...       (dominated)            depth 2
//! ```
//!
//! Node lifecycle: `active` → `dominated` (kept for audit, never expanded)
//! or `active` → `winner` (goal met, terminal).

mod engine;
mod summary;

pub use engine::{Collaborators, ExplorationEngine, ExplorationRequest, StepOutcome};
pub use summary::{summarize, ExplorationSummary, PathStep};

use adoptsim_env::{ExperimentId, ExplorationId, NodeId, RunId, ScorecardParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::persona::Persona;
use crate::simulation::{splitmix64, AggregatedOutcomes, RunResult, SimulationConfig};

/// Status of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Dominated,
    Winner,
}

/// Status of an exploration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationStatus {
    Running,
    Completed,
    Exhausted,
}

/// Target the search tries to reach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Target population success rate
    pub value: f64,
}

/// Search budget and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationConfig {
    /// Deepest level a node may be created at
    pub max_depth: u32,

    /// Children a node may have before it stops being expandable
    pub max_children_per_node: u32,

    /// Total nodes including the root
    pub max_total_nodes: u32,

    /// Calls to the proposal collaborator
    pub max_external_calls: u32,

    /// Success-rate gain over the parent that protects a child from pruning
    pub min_improvement: f64,

    /// Upper bound on one proposal call
    pub proposal_timeout_ms: u64,

    /// Scenario every node is simulated under
    pub scenario_id: String,

    /// Simulation settings every node is simulated with
    pub simulation: SimulationConfig,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_children_per_node: 3,
            max_total_nodes: 50,
            max_external_calls: 60,
            min_improvement: 0.01,
            proposal_timeout_ms: 30_000,
            scenario_id: "baseline".to_string(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl ExplorationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range("min_improvement", self.min_improvement, 0.0, 1.0)?;
        if self.proposal_timeout_ms == 0 {
            return Err(ConfigError::Invalid("proposal_timeout_ms must be positive".to_string()));
        }
        if self.max_total_nodes == 0 {
            return Err(ConfigError::Invalid("max_total_nodes must leave room for the root".to_string()));
        }
        self.simulation.validate()
    }
}

/// Outcome of simulating one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub run_id: RunId,
    pub did_not_try_rate: f64,
    pub failed_rate: f64,
    pub success_rate: f64,
    pub total_synths: usize,
}

impl SimulationSummary {
    pub fn from_run(result: &RunResult) -> Self {
        let AggregatedOutcomes {
            did_not_try,
            failed,
            success,
        } = result.run.aggregated_outcomes;
        Self {
            run_id: result.run.id,
            did_not_try_rate: did_not_try,
            failed_rate: failed,
            success_rate: success,
            total_synths: result.run.total_synths,
        }
    }

    /// Strict dominance: more success without losing more personas before they try.
    pub fn strictly_dominates(&self, other: &SimulationSummary) -> bool {
        self.success_rate > other.success_rate && self.did_not_try_rate <= other.did_not_try_rate
    }
}

/// One variant in the exploration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioNode {
    pub id: NodeId,
    pub exploration_id: ExplorationId,
    pub parent_id: Option<NodeId>,
    pub depth: u32,
    pub action_applied: Option<String>,
    pub action_category: Option<String>,
    pub rationale: Option<String>,
    pub scorecard_params: ScorecardParams,
    pub simulation_results: Option<SimulationSummary>,
    pub execution_time_seconds: f64,
    pub node_status: NodeStatus,
    pub created_at: DateTime<Utc>,
}

impl ScenarioNode {
    /// The baseline node.
    pub fn root(
        exploration_id: ExplorationId,
        scorecard_params: ScorecardParams,
        baseline: &RunResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NodeId::new(),
            exploration_id,
            parent_id: None,
            depth: 0,
            action_applied: None,
            action_category: None,
            rationale: None,
            scorecard_params,
            simulation_results: Some(SimulationSummary::from_run(baseline)),
            execution_time_seconds: baseline.run.execution_time_seconds,
            node_status: NodeStatus::Active,
            created_at,
        }
    }

    /// An unsimulated child of `parent` carrying the parent's scorecard.
    pub fn child_of(parent: &ScenarioNode, created_at: DateTime<Utc>) -> Self {
        Self {
            id: NodeId::new(),
            exploration_id: parent.exploration_id,
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
            action_applied: None,
            action_category: None,
            rationale: None,
            scorecard_params: parent.scorecard_params,
            simulation_results: None,
            execution_time_seconds: 0.0,
            node_status: NodeStatus::Active,
            created_at,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn success_rate(&self) -> Option<f64> {
        self.simulation_results.map(|r| r.success_rate)
    }
}

/// Identity of the population an exploration simulates.
///
/// Every node of a tree must be evaluated on the same personas, so a resumed
/// exploration is checked against this record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub size: usize,

    /// Order-sensitive digest of the persona ids
    pub fingerprint: u64,

    /// Seed the population was generated from, when known
    pub seed: Option<u64>,
}

impl PopulationRecord {
    pub fn of(personas: &[Persona], seed: Option<u64>) -> Self {
        Self {
            size: personas.len(),
            fingerprint: fingerprint(personas),
            seed,
        }
    }

    pub fn matches(&self, personas: &[Persona]) -> bool {
        self.size == personas.len() && self.fingerprint == fingerprint(personas)
    }
}

fn fingerprint(personas: &[Persona]) -> u64 {
    personas.iter().fold(personas.len() as u64, |acc, persona| {
        let id = persona.id.as_uuid().as_u128();
        let acc = splitmix64(acc ^ (id >> 64) as u64);
        splitmix64(acc ^ id as u64)
    })
}

/// One search session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exploration {
    pub id: ExplorationId,
    pub experiment_id: ExperimentId,

    /// Run that produced the root's outcome
    pub baseline_analysis_id: RunId,

    pub goal: Goal,
    pub config: ExplorationConfig,
    pub population: PopulationRecord,
    pub status: ExplorationStatus,
    pub current_depth: u32,
    pub total_nodes: u32,
    pub total_external_calls: u32,
    pub best_success_rate: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Exploration {
    pub fn is_running(&self) -> bool {
        self.status == ExplorationStatus::Running
    }
}
