//! Adoptsim Core - Monte Carlo Adoption Simulation and Scenario Search
//!
//! Estimates how a population of synthetic personas reacts to a feature
//! design and searches for design changes that reach a target success rate:
//!
//! 1. **Latent Trait Deriver**: observable persona scores → behavioural propensities
//! 2. **Outcome Simulator**: noisy attempt/success gates, sampled in parallel
//!    with reproducible seeding
//! 3. **Scenario Exploration Search**: best-first tree search (deepest, then
//!    oldest node) over scorecard variants driven by an external action proposer
//! 4. **Exploration Store**: persistence for runs, outcomes and trees
//!    (in-memory or sled)

pub mod calibration;
pub mod error;
pub mod exploration;
pub mod persona;
pub mod scenario;
pub mod scorecard;
pub mod simulation;
pub mod store;

// Re-export key types for convenience
pub use calibration::Calibration;
pub use error::{ConfigError, ExplorationError, SimError, StoreError};
pub use exploration::{
    summarize, Collaborators, Exploration, ExplorationConfig, ExplorationEngine, ExplorationRequest,
    ExplorationStatus, ExplorationSummary, Goal, NodeStatus, PathStep, PopulationRecord, ScenarioNode,
    SimulationSummary, StepOutcome,
};
pub use persona::{LatentTraits, ObservableProfile, Persona, TraitWeights};
pub use scenario::{Scenario, ScenarioTable};
pub use scorecard::{DimensionScore, Scorecard};
pub use simulation::{
    AggregatedOutcomes, GateCalibration, OutcomeDistribution, OutcomeModel, PersonaFailure, PersonaOutcome,
    RunResult, RunStatus, SimulationConfig, SimulationRun, Simulator, ThresholdGates,
};
pub use store::{ExplorationStore, MemoryExplorationStore, SledExplorationStore, StatusCounts};
