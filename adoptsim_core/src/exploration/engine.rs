//! The exploration state machine.
//!
//! One engine owns one exploration and is its only writer. Each call to
//! [`ExplorationEngine::step`] runs one pass of the loop:
//!
//! 1. terminate on goal (winner + `completed`) or on an empty/spent budget (`exhausted`)
//! 2. select the deepest, then oldest, expandable active node
//! 3. ask the proposal collaborator for one action, under a timeout
//! 4. apply the deltas to a child scorecard
//! 5. simulate the child with the exploration's scenario, population and config
//! 6. dominance update
//! 7. persist the child and the exploration counters
//!
//! The engine holds no tree in memory; every decision is taken from the store,
//! which is what makes stopping between steps and resuming safe.

use adoptsim_env::{
    ActionProposer, AdoptsimContext, EnvError, ExperimentId, ExplorationId, NodeId, Proposal, ProposalRequest,
    ScorecardId, ScorecardParams,
};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    Exploration, ExplorationConfig, ExplorationStatus, Goal, NodeStatus, PopulationRecord, ScenarioNode,
    SimulationSummary,
};
use crate::error::{ConfigError, ExplorationError, StoreError};
use crate::persona::Persona;
use crate::scenario::{Scenario, ScenarioTable};
use crate::scorecard::validate_params;
use crate::simulation::{RunResult, RunStatus, Simulator};
use crate::store::ExplorationStore;

/// What a caller asks for when opening an exploration.
#[derive(Debug, Clone)]
pub struct ExplorationRequest {
    pub experiment_id: ExperimentId,

    /// Baseline scorecard of the root node
    pub scorecard: ScorecardParams,

    pub goal: Goal,
    pub config: ExplorationConfig,

    /// Seed the population was generated from, recorded so it can be rebuilt on resume
    pub population_seed: Option<u64>,
}

impl ExplorationRequest {
    pub fn new(scorecard: ScorecardParams, goal: f64, config: ExplorationConfig) -> Self {
        Self {
            experiment_id: ExperimentId::new(),
            scorecard,
            goal: Goal { value: goal },
            config,
            population_seed: None,
        }
    }

    pub fn with_population_seed(mut self, seed: u64) -> Self {
        self.population_seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range("goal", self.goal.value, 0.0, 1.0)?;
        validate_params(&self.scorecard)?;
        self.config.validate()
    }
}

/// Result of one pass of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// A child was created
    Expanded { node_id: NodeId, status: NodeStatus },

    /// The exploration is over
    Finished(ExplorationStatus),
}

/// Shared collaborators an engine works with.
pub struct Collaborators<Ctx: AdoptsimContext> {
    pub ctx: Arc<Ctx>,
    pub proposer: Arc<dyn ActionProposer>,
    pub store: Arc<dyn ExplorationStore>,
    pub simulator: Simulator,

    /// Read-only persona population
    pub population: Arc<[Persona]>,
}

impl<Ctx: AdoptsimContext> Clone for Collaborators<Ctx> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            proposer: Arc::clone(&self.proposer),
            store: Arc::clone(&self.store),
            simulator: self.simulator.clone(),
            population: Arc::clone(&self.population),
        }
    }
}

/// Best-first search over scorecard variants.
pub struct ExplorationEngine<Ctx: AdoptsimContext> {
    ctx: Arc<Ctx>,
    proposer: Arc<dyn ActionProposer>,
    store: Arc<dyn ExplorationStore>,
    simulator: Simulator,
    population: Arc<[Persona]>,
    scenario: Scenario,
    exploration: Exploration,
}

impl<Ctx: AdoptsimContext> ExplorationEngine<Ctx> {
    /// Opens a new exploration, simulating the baseline scorecard for the root.
    pub fn start(
        collaborators: Collaborators<Ctx>,
        scenarios: &ScenarioTable,
        mut request: ExplorationRequest,
    ) -> Result<Self, ExplorationError> {
        request.validate()?;
        let scenario = scenarios.get(&request.config.scenario_id)?.clone();

        // Every node shares one seed so sibling comparisons see the same draws
        if request.config.simulation.seed.is_none() {
            request.config.simulation.seed = Some(collaborators.ctx.derive_seed(0));
        }

        let baseline = collaborators.simulator.simulate(
            &collaborators.population,
            ScorecardId::new(),
            &request.scorecard,
            &scenario,
            &request.config.simulation,
        )?;

        Self::open(collaborators, scenario, request, baseline)
    }

    /// Opens a new exploration from an already computed baseline run.
    ///
    /// The run must be completed and simulated under the configured scenario.
    /// When the config has no seed, the baseline's seed is adopted.
    pub fn start_with_baseline(
        collaborators: Collaborators<Ctx>,
        scenarios: &ScenarioTable,
        mut request: ExplorationRequest,
        baseline: RunResult,
    ) -> Result<Self, ExplorationError> {
        request.validate()?;
        let scenario = scenarios.get(&request.config.scenario_id)?.clone();

        if baseline.run.status != RunStatus::Completed {
            return Err(ConfigError::Invalid(format!("baseline run {} is not completed", baseline.run.id)).into());
        }
        if baseline.run.scenario_id != scenario.id {
            return Err(ConfigError::Invalid(format!(
                "baseline run used scenario {} but the exploration uses {}",
                baseline.run.scenario_id, scenario.id
            ))
            .into());
        }
        if request.config.simulation.seed.is_none() {
            request.config.simulation.seed = baseline.run.config.seed;
        }

        Self::open(collaborators, scenario, request, baseline)
    }

    /// Reopens a running exploration from the store.
    ///
    /// Counters are reconciled against the persisted tree, so an engine that
    /// stopped between persisting a node and persisting the exploration
    /// resumes with consistent numbers.
    pub fn resume(
        collaborators: Collaborators<Ctx>,
        scenarios: &ScenarioTable,
        exploration_id: ExplorationId,
    ) -> Result<Self, ExplorationError> {
        let store = &collaborators.store;
        let mut exploration = store
            .get_exploration(exploration_id)?
            .ok_or(StoreError::ExplorationNotFound(exploration_id))?;
        if !exploration.is_running() {
            return Err(ExplorationError::AlreadyFinished(exploration_id));
        }
        if !exploration.population.matches(&collaborators.population) {
            return Err(ExplorationError::PopulationMismatch {
                exploration: exploration_id,
                expected: exploration.population.size,
                found: collaborators.population.len(),
            });
        }
        let scenario = scenarios.get(&exploration.config.scenario_id)?.clone();

        let nodes = store.list_nodes(exploration_id)?;
        if !nodes.iter().any(ScenarioNode::is_root) {
            return Err(ExplorationError::MissingRoot(exploration_id));
        }

        // Every call creates exactly one node
        let created = nodes.len() as u32;
        exploration.total_nodes = created;
        exploration.total_external_calls = exploration.total_external_calls.max(created - 1);
        exploration.current_depth = nodes.iter().map(|n| n.depth).max().unwrap_or(0);
        exploration.best_success_rate = nodes
            .iter()
            .filter_map(ScenarioNode::success_rate)
            .fold(exploration.best_success_rate, f64::max);
        store.update_exploration(&exploration)?;

        info!(
            "Resumed exploration {} with {} nodes, {} calls, best={:.3}",
            exploration.id, exploration.total_nodes, exploration.total_external_calls, exploration.best_success_rate
        );

        Ok(Self::assemble(collaborators, scenario, exploration))
    }

    fn assemble(collaborators: Collaborators<Ctx>, scenario: Scenario, exploration: Exploration) -> Self {
        let Collaborators {
            ctx,
            proposer,
            store,
            simulator,
            population,
        } = collaborators;
        Self {
            ctx,
            proposer,
            store,
            simulator,
            population,
            scenario,
            exploration,
        }
    }

    fn open(
        collaborators: Collaborators<Ctx>,
        scenario: Scenario,
        request: ExplorationRequest,
        baseline: RunResult,
    ) -> Result<Self, ExplorationError> {
        let ctx = &collaborators.ctx;
        let store = &collaborators.store;
        let now = ctx.wall_clock();

        let exploration = Exploration {
            id: ExplorationId::new(),
            experiment_id: request.experiment_id,
            baseline_analysis_id: baseline.run.id,
            goal: request.goal,
            config: request.config,
            population: PopulationRecord::of(&collaborators.population, request.population_seed),
            status: ExplorationStatus::Running,
            current_depth: 0,
            total_nodes: 1,
            total_external_calls: 0,
            best_success_rate: baseline.success_rate(),
            started_at: now,
            completed_at: None,
        };
        let root = ScenarioNode::root(exploration.id, request.scorecard, &baseline, now);

        persist_run(store.as_ref(), &baseline)?;
        store.create_exploration(&exploration)?;
        store.insert_node(&root)?;

        info!(
            "Exploration {} started: goal={:.3} baseline={:.3} scenario={} proposer={}",
            exploration.id,
            exploration.goal.value,
            exploration.best_success_rate,
            scenario.id,
            collaborators.proposer.name()
        );

        Ok(Self::assemble(collaborators, scenario, exploration))
    }

    /// Snapshot of the exploration record.
    pub fn exploration(&self) -> &Exploration {
        &self.exploration
    }

    pub fn id(&self) -> ExplorationId {
        self.exploration.id
    }

    /// Runs the loop until the exploration completes or is exhausted.
    pub async fn run(&mut self) -> Result<Exploration, ExplorationError> {
        loop {
            if let StepOutcome::Finished(_) = self.step().await? {
                return Ok(self.exploration.clone());
            }
        }
    }

    /// Runs one pass of the loop.
    pub async fn step(&mut self) -> Result<StepOutcome, ExplorationError> {
        if !self.exploration.is_running() {
            return Ok(StepOutcome::Finished(self.exploration.status));
        }
        if let Some(status) = self.check_termination()? {
            return Ok(StepOutcome::Finished(status));
        }

        let Some(parent) = self.select()? else {
            debug!("Exploration {}: no expandable node left", self.exploration.id);
            self.finish(ExplorationStatus::Exhausted)?;
            return Ok(StepOutcome::Finished(ExplorationStatus::Exhausted));
        };
        debug!(
            "Exploration {}: expanding node {} at depth {}",
            self.exploration.id, parent.id, parent.depth
        );

        let request = self.proposal_request(&parent)?;
        let proposal = self.request_proposal(&request).await;
        self.exploration.total_external_calls += 1;

        let child = self.build_child(&parent, proposal)?;
        self.store.insert_node(&child)?;

        self.exploration.total_nodes += 1;
        self.exploration.current_depth = self.exploration.current_depth.max(child.depth);
        if let Some(rate) = child.success_rate() {
            self.exploration.best_success_rate = self.exploration.best_success_rate.max(rate);
        }
        self.store.update_exploration(&self.exploration)?;

        info!(
            "Node {} depth={} {:?} success={} action={:?}",
            child.id,
            child.depth,
            child.node_status,
            child
                .success_rate()
                .map(|r| format!("{:.3}", r))
                .unwrap_or_else(|| "-".to_string()),
            child.action_applied.as_deref().unwrap_or("")
        );

        Ok(StepOutcome::Expanded {
            node_id: child.id,
            status: child.node_status,
        })
    }

    fn check_termination(&mut self) -> Result<Option<ExplorationStatus>, ExplorationError> {
        let id = self.exploration.id;

        if let Some(best) = self.store.best_node(id)? {
            let reached = best
                .success_rate()
                .is_some_and(|rate| rate >= self.exploration.goal.value);
            if reached {
                if self.store.get_winner(id)?.is_none() {
                    self.store.update_node_status(best.id, NodeStatus::Winner)?;
                    info!("Exploration {}: node {} reached the goal", id, best.id);
                }
                self.finish(ExplorationStatus::Completed)?;
                return Ok(Some(ExplorationStatus::Completed));
            }
        }

        let config = &self.exploration.config;
        let spent = if self.exploration.total_nodes >= config.max_total_nodes {
            Some("node")
        } else if self.exploration.total_external_calls >= config.max_external_calls {
            Some("call")
        } else if self.store.list_frontier(id)?.is_empty() {
            Some("frontier")
        } else {
            None
        };

        if let Some(budget) = spent {
            debug!("Exploration {}: {} budget exhausted", id, budget);
            self.finish(ExplorationStatus::Exhausted)?;
            return Ok(Some(ExplorationStatus::Exhausted));
        }
        Ok(None)
    }

    /// Deepest expandable active node; ties go to the earliest created, then
    /// to store order.
    fn select(&self) -> Result<Option<ScenarioNode>, ExplorationError> {
        let nodes = self.store.list_nodes(self.exploration.id)?;
        let config = &self.exploration.config;

        let mut children: HashMap<NodeId, u32> = HashMap::new();
        for parent_id in nodes.iter().filter_map(|n| n.parent_id) {
            *children.entry(parent_id).or_default() += 1;
        }

        Ok(nodes
            .into_iter()
            .enumerate()
            .filter(|(_, n)| {
                n.node_status == NodeStatus::Active
                    && n.depth < config.max_depth
                    && children.get(&n.id).copied().unwrap_or(0) < config.max_children_per_node
            })
            .min_by_key(|(order, n)| (Reverse(n.depth), n.created_at, *order))
            .map(|(_, n)| n))
    }

    fn proposal_request(&self, node: &ScenarioNode) -> Result<ProposalRequest, ExplorationError> {
        let action_path = self
            .store
            .ancestor_path(node.id)?
            .into_iter()
            .filter_map(|n| n.action_applied)
            .collect();
        let tried_actions = self
            .store
            .list_children(node.id)?
            .into_iter()
            .filter_map(|n| n.action_applied)
            .collect();

        Ok(ProposalRequest {
            exploration_id: self.exploration.id,
            node_id: node.id,
            depth: node.depth,
            scorecard: node.scorecard_params,
            goal: self.exploration.goal.value,
            current_success_rate: node.success_rate(),
            action_path,
            tried_actions,
        })
    }

    async fn request_proposal(&self, request: &ProposalRequest) -> Result<Proposal, EnvError> {
        let timeout_ms = self.exploration.config.proposal_timeout_ms;
        let asked_at = self.ctx.now();

        // The proposer is an external service, so its deadline is real time.
        // A virtual sleep returns at once and would expire every call.
        let result = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.proposer.propose_action(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EnvError::Timeout(timeout_ms)),
        };

        debug!(
            "Proposal from {} for node {} answered in {:?}",
            self.proposer.name(),
            request.node_id,
            self.ctx.now().saturating_sub(asked_at)
        );
        result
    }

    fn build_child(
        &self,
        parent: &ScenarioNode,
        proposal: Result<Proposal, EnvError>,
    ) -> Result<ScenarioNode, ExplorationError> {
        let mut child = ScenarioNode::child_of(parent, self.ctx.wall_clock());
        child.node_status = NodeStatus::Dominated;

        match proposal {
            Ok(Proposal::Action(action)) => {
                child.action_applied = Some(action.action_text);
                child.action_category = action.category;
                child.rationale = Some(action.rationale);

                if let Err(reason) = action.deltas.validate() {
                    warn!("Unusable deltas for child of {}: {}", parent.id, reason);
                    return Ok(child);
                }

                child.scorecard_params = parent.scorecard_params.apply(&action.deltas);
                let result = self.simulator.simulate(
                    &self.population,
                    ScorecardId::new(),
                    &child.scorecard_params,
                    &self.scenario,
                    &self.exploration.config.simulation,
                )?;
                persist_run(self.store.as_ref(), &result)?;

                let summary = SimulationSummary::from_run(&result);
                child.simulation_results = Some(summary);
                child.execution_time_seconds = result.run.execution_time_seconds;
                child.node_status = self.dominance(parent, &summary, result.run.status)?;
            }
            Ok(Proposal::Malformed {
                action_text,
                rationale,
                reason,
            }) => {
                warn!("Malformed proposal for child of {}: {}", parent.id, reason);
                child.action_applied = action_text;
                child.rationale = rationale.or(Some(format!("malformed proposal: {}", reason)));
            }
            Err(e) => {
                warn!("Proposal for child of {} failed: {}", parent.id, e);
                child.rationale = Some(format!("proposal failed: {}", e));
            }
        }
        Ok(child)
    }

    /// A child that does not beat its parent by `min_improvement` is pruned
    /// when a sibling already strictly dominates it.
    fn dominance(
        &self,
        parent: &ScenarioNode,
        summary: &SimulationSummary,
        run_status: RunStatus,
    ) -> Result<NodeStatus, ExplorationError> {
        if run_status == RunStatus::Failed {
            return Ok(NodeStatus::Dominated);
        }

        let parent_rate = parent.success_rate().unwrap_or(0.0);
        if summary.success_rate - parent_rate >= self.exploration.config.min_improvement {
            return Ok(NodeStatus::Active);
        }

        let beaten = self
            .store
            .list_children(parent.id)?
            .iter()
            .filter_map(|sibling| sibling.simulation_results)
            .any(|sibling| sibling.strictly_dominates(summary));

        Ok(if beaten {
            NodeStatus::Dominated
        } else {
            NodeStatus::Active
        })
    }

    fn finish(&mut self, status: ExplorationStatus) -> Result<(), ExplorationError> {
        self.exploration.status = status;
        self.exploration.completed_at = Some(self.ctx.wall_clock());
        self.store.update_exploration(&self.exploration)?;

        info!(
            "Exploration {} {:?}: {} nodes, {} calls, best={:.3}",
            self.exploration.id,
            status,
            self.exploration.total_nodes,
            self.exploration.total_external_calls,
            self.exploration.best_success_rate
        );
        Ok(())
    }
}

/// Stores a run and its persona outcomes unless they are already persisted.
fn persist_run(store: &dyn ExplorationStore, result: &RunResult) -> Result<(), StoreError> {
    if store.get_run(result.run.id)?.is_none() {
        store.save_run(&result.run)?;
    }
    if store.list_persona_outcomes(result.run.id)?.is_empty() && !result.outcomes.is_empty() {
        store.save_persona_outcomes(result.run.id, &result.outcomes)?;
    }
    Ok(())
}
