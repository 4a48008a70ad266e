//! Exploration Store.
//!
//! Persistence contract for explorations, tree nodes, simulation runs and
//! persona outcomes. Only the primitive reads and writes must be provided;
//! the tree queries (root, frontier, ancestor path, ...) have default
//! implementations on top of them that backends may override with indexes.
//!
//! Writes for one exploration come from the single engine that owns it;
//! reads may come from anywhere at any time.

mod memory;
mod sled_store;

pub use memory::MemoryExplorationStore;
pub use sled_store::SledExplorationStore;

use adoptsim_env::{ExplorationId, NodeId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::StoreError;
use crate::exploration::{Exploration, NodeStatus, ScenarioNode};
use crate::simulation::{PersonaOutcome, SimulationRun};

/// Node counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub active: usize,
    pub dominated: usize,
    pub winner: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.active + self.dominated + self.winner
    }

    fn record(&mut self, status: NodeStatus) {
        match status {
            NodeStatus::Active => self.active += 1,
            NodeStatus::Dominated => self.dominated += 1,
            NodeStatus::Winner => self.winner += 1,
        }
    }
}

/// Trait for exploration persistence.
///
/// Implementations must be thread-safe.
pub trait ExplorationStore: Send + Sync {
    /// Persists a new exploration.
    fn create_exploration(&self, exploration: &Exploration) -> Result<(), StoreError>;

    /// Overwrites an existing exploration's counters and status.
    fn update_exploration(&self, exploration: &Exploration) -> Result<(), StoreError>;

    fn get_exploration(&self, id: ExplorationId) -> Result<Option<Exploration>, StoreError>;

    fn list_explorations(&self) -> Result<Vec<Exploration>, StoreError>;

    /// Persists a new node.
    ///
    /// Rejects duplicate ids, a second root, a missing parent, a parent from
    /// another exploration and a depth that is not `parent.depth + 1`.
    fn insert_node(&self, node: &ScenarioNode) -> Result<(), StoreError>;

    /// Changes a node's status. Rejects a second winner in the same exploration.
    fn update_node_status(&self, id: NodeId, status: NodeStatus) -> Result<(), StoreError>;

    fn get_node(&self, id: NodeId) -> Result<Option<ScenarioNode>, StoreError>;

    /// All nodes of an exploration in creation order.
    fn list_nodes(&self, exploration_id: ExplorationId) -> Result<Vec<ScenarioNode>, StoreError>;

    /// Persists a run. A finished run can not be overwritten.
    fn save_run(&self, run: &SimulationRun) -> Result<(), StoreError>;

    fn get_run(&self, id: RunId) -> Result<Option<SimulationRun>, StoreError>;

    /// Persists the per-persona outcomes of a run, once.
    fn save_persona_outcomes(&self, run_id: RunId, outcomes: &[PersonaOutcome]) -> Result<(), StoreError>;

    fn list_persona_outcomes(&self, run_id: RunId) -> Result<Vec<PersonaOutcome>, StoreError>;

    fn get_root(&self, exploration_id: ExplorationId) -> Result<Option<ScenarioNode>, StoreError> {
        Ok(self
            .list_nodes(exploration_id)?
            .into_iter()
            .find(ScenarioNode::is_root))
    }

    fn get_winner(&self, exploration_id: ExplorationId) -> Result<Option<ScenarioNode>, StoreError> {
        Ok(self
            .list_nodes(exploration_id)?
            .into_iter()
            .find(|n| n.node_status == NodeStatus::Winner))
    }

    /// Active nodes in creation order.
    fn list_frontier(&self, exploration_id: ExplorationId) -> Result<Vec<ScenarioNode>, StoreError> {
        Ok(self
            .list_nodes(exploration_id)?
            .into_iter()
            .filter(|n| n.node_status == NodeStatus::Active)
            .collect())
    }

    /// Children of a node in creation order.
    fn list_children(&self, parent_id: NodeId) -> Result<Vec<ScenarioNode>, StoreError> {
        let parent = self
            .get_node(parent_id)?
            .ok_or(StoreError::NodeNotFound(parent_id))?;
        Ok(self
            .list_nodes(parent.exploration_id)?
            .into_iter()
            .filter(|n| n.parent_id == Some(parent_id))
            .collect())
    }

    /// Nodes from the root down to `node_id`, ordered by depth.
    ///
    /// Iterative parent-pointer walk; a cycle or a dangling parent is an
    /// integrity error.
    fn ancestor_path(&self, node_id: NodeId) -> Result<Vec<ScenarioNode>, StoreError> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(node_id);

        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Err(StoreError::Integrity(format!("cycle through node {}", id)));
            }
            let node = self.get_node(id)?.ok_or_else(|| {
                if id == node_id {
                    StoreError::NodeNotFound(id)
                } else {
                    StoreError::Integrity(format!("dangling parent {}", id))
                }
            })?;
            cursor = node.parent_id;
            path.push(node);
        }

        path.reverse();
        Ok(path)
    }

    /// Simulated node with the highest success rate; earliest wins ties.
    fn best_node(&self, exploration_id: ExplorationId) -> Result<Option<ScenarioNode>, StoreError> {
        let mut best: Option<ScenarioNode> = None;
        for node in self.list_nodes(exploration_id)? {
            let Some(rate) = node.success_rate() else {
                continue;
            };
            let better = match best.as_ref().and_then(ScenarioNode::success_rate) {
                Some(current) => rate > current,
                None => true,
            };
            if better {
                best = Some(node);
            }
        }
        Ok(best)
    }

    fn status_counts(&self, exploration_id: ExplorationId) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for node in self.list_nodes(exploration_id)? {
            counts.record(node.node_status);
        }
        Ok(counts)
    }
}

/// Checks a node against its parent before insertion.
pub(crate) fn check_parent(node: &ScenarioNode, parent: Option<&ScenarioNode>) -> Result<(), StoreError> {
    match (node.parent_id, parent) {
        (None, _) => {
            if node.depth != 0 {
                return Err(StoreError::Integrity(format!(
                    "root {} has depth {}",
                    node.id, node.depth
                )));
            }
            Ok(())
        }
        (Some(parent_id), None) => Err(StoreError::Integrity(format!(
            "parent {} of node {} is not persisted",
            parent_id, node.id
        ))),
        (Some(_), Some(parent)) => {
            if parent.exploration_id != node.exploration_id {
                return Err(StoreError::Integrity(format!(
                    "node {} and parent {} belong to different explorations",
                    node.id, parent.id
                )));
            }
            if node.depth != parent.depth + 1 {
                return Err(StoreError::Integrity(format!(
                    "node {} has depth {} under parent at depth {}",
                    node.id, node.depth, parent.depth
                )));
            }
            Ok(())
        }
    }
}

/// Shared behaviour tests every backend must pass.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::exploration::{ExplorationConfig, ExplorationStatus, Goal, PopulationRecord, SimulationSummary};
    use crate::persona::LatentTraits;
    use crate::simulation::{AggregatedOutcomes, RunStatus, SimulationConfig};
    use adoptsim_env::{ExperimentId, PersonaId, ScorecardId, ScorecardParams};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Barrier;

    pub fn exploration() -> Exploration {
        Exploration {
            id: ExplorationId::new(),
            experiment_id: ExperimentId::new(),
            baseline_analysis_id: RunId::new(),
            goal: Goal { value: 0.6 },
            config: ExplorationConfig::default(),
            population: PopulationRecord {
                size: 3,
                fingerprint: 0x5eed,
                seed: Some(42),
            },
            status: ExplorationStatus::Running,
            current_depth: 0,
            total_nodes: 1,
            total_external_calls: 0,
            best_success_rate: 0.3,
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    pub fn node(exploration_id: ExplorationId, parent: Option<&ScenarioNode>, success: Option<f64>, tick: i64) -> ScenarioNode {
        ScenarioNode {
            id: NodeId::new(),
            exploration_id,
            parent_id: parent.map(|p| p.id),
            depth: parent.map(|p| p.depth + 1).unwrap_or(0),
            action_applied: parent.map(|_| format!("action {}", tick)),
            action_category: None,
            rationale: None,
            scorecard_params: ScorecardParams::uniform(0.5),
            simulation_results: success.map(|s| SimulationSummary {
                run_id: RunId::new(),
                did_not_try_rate: 0.2,
                failed_rate: 0.8 - s,
                success_rate: s,
                total_synths: 10,
            }),
            execution_time_seconds: 0.01,
            node_status: NodeStatus::Active,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(tick),
        }
    }

    pub fn run(status: RunStatus) -> SimulationRun {
        SimulationRun {
            id: RunId::new(),
            scorecard_id: ScorecardId::new(),
            scenario_id: "baseline".to_string(),
            config: SimulationConfig::seeded(100, 0.1, 42),
            status,
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            completed_at: None,
            total_synths: 3,
            aggregated_outcomes: AggregatedOutcomes {
                did_not_try: 0.25,
                failed: 0.25,
                success: 0.5,
            },
            execution_time_seconds: 0.5,
        }
    }

    /// root ─┬─ a ─── c
    ///       └─ b
    pub fn seeded_tree<S: ExplorationStore + ?Sized>(store: &S) -> (Exploration, [ScenarioNode; 4]) {
        let exploration = exploration();
        store.create_exploration(&exploration).unwrap();

        let root = node(exploration.id, None, Some(0.3), 0);
        let a = node(exploration.id, Some(&root), Some(0.45), 1);
        let b = node(exploration.id, Some(&root), Some(0.35), 2);
        let c = node(exploration.id, Some(&a), Some(0.45), 3);
        for n in [&root, &a, &b, &c] {
            store.insert_node(n).unwrap();
        }
        (exploration, [root, a, b, c])
    }

    pub fn exploration_roundtrip<S: ExplorationStore + ?Sized>(store: &S) {
        let mut exploration = exploration();
        store.create_exploration(&exploration).unwrap();
        assert_eq!(store.get_exploration(exploration.id).unwrap(), Some(exploration.clone()));

        exploration.total_nodes = 7;
        exploration.status = ExplorationStatus::Exhausted;
        store.update_exploration(&exploration).unwrap();
        assert_eq!(store.get_exploration(exploration.id).unwrap(), Some(exploration.clone()));
        assert_eq!(store.list_explorations().unwrap().len(), 1);

        assert!(store.get_exploration(ExplorationId::new()).unwrap().is_none());
        assert!(matches!(
            store.update_exploration(&super::contract::exploration()),
            Err(StoreError::ExplorationNotFound(_))
        ));
    }

    pub fn tree_queries<S: ExplorationStore + ?Sized>(store: &S) {
        let (exploration, [root, a, b, c]) = seeded_tree(store);

        assert_eq!(store.get_root(exploration.id).unwrap().unwrap().id, root.id);

        let ids: Vec<NodeId> = store.list_nodes(exploration.id).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![root.id, a.id, b.id, c.id]);

        let children: Vec<NodeId> = store.list_children(root.id).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(children, vec![a.id, b.id]);
        assert!(store.list_children(c.id).unwrap().is_empty());

        let path: Vec<u32> = store.ancestor_path(c.id).unwrap().iter().map(|n| n.depth).collect();
        assert_eq!(path, vec![0, 1, 2]);
        assert_eq!(store.ancestor_path(root.id).unwrap().len(), 1);

        // Tie between a and c goes to the earlier node
        assert_eq!(store.best_node(exploration.id).unwrap().unwrap().id, a.id);

        store.update_node_status(b.id, NodeStatus::Dominated).unwrap();
        let frontier: Vec<NodeId> = store.list_frontier(exploration.id).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(frontier, vec![root.id, a.id, c.id]);

        assert!(store.get_winner(exploration.id).unwrap().is_none());
        store.update_node_status(c.id, NodeStatus::Winner).unwrap();
        assert_eq!(store.get_winner(exploration.id).unwrap().unwrap().id, c.id);

        let counts = store.status_counts(exploration.id).unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                active: 2,
                dominated: 1,
                winner: 1
            }
        );
    }

    pub fn integrity<S: ExplorationStore + ?Sized>(store: &S) {
        let (exploration, [root, a, _, _]) = seeded_tree(store);

        // Duplicate id
        assert!(matches!(store.insert_node(&a), Err(StoreError::Integrity(_))));

        // Second root
        let second_root = node(exploration.id, None, Some(0.1), 9);
        assert!(matches!(store.insert_node(&second_root), Err(StoreError::Integrity(_))));

        // Unpersisted parent
        let ghost_parent = node(exploration.id, Some(&root), None, 9);
        let orphan = node(exploration.id, Some(&ghost_parent), None, 10);
        assert!(matches!(store.insert_node(&orphan), Err(StoreError::Integrity(_))));

        // Wrong depth
        let mut skipper = node(exploration.id, Some(&a), None, 11);
        skipper.depth = 5;
        assert!(matches!(store.insert_node(&skipper), Err(StoreError::Integrity(_))));

        // Second winner
        store.update_node_status(a.id, NodeStatus::Winner).unwrap();
        assert!(matches!(
            store.update_node_status(root.id, NodeStatus::Winner),
            Err(StoreError::Integrity(_))
        ));
        // Re-marking the same winner is fine
        store.update_node_status(a.id, NodeStatus::Winner).unwrap();

        assert!(matches!(
            store.update_node_status(NodeId::new(), NodeStatus::Dominated),
            Err(StoreError::NodeNotFound(_))
        ));
        assert!(matches!(store.ancestor_path(NodeId::new()), Err(StoreError::NodeNotFound(_))));
    }

    pub fn runs_and_outcomes<S: ExplorationStore + ?Sized>(store: &S) {
        let mut running = run(RunStatus::Running);
        store.save_run(&running).unwrap();

        running.status = RunStatus::Completed;
        store.save_run(&running).unwrap();
        assert_eq!(store.get_run(running.id).unwrap(), Some(running.clone()));

        // Completed runs are immutable
        let mut tampered = running.clone();
        tampered.aggregated_outcomes.success = 0.9;
        assert!(matches!(store.save_run(&tampered), Err(StoreError::Integrity(_))));

        let outcomes: Vec<PersonaOutcome> = (0..3)
            .map(|i| PersonaOutcome {
                run_id: running.id,
                persona_id: PersonaId::from_seed(i),
                did_not_try_rate: 0.25,
                failed_rate: 0.25,
                success_rate: 0.5,
                traits: LatentTraits::uniform(0.5),
            })
            .collect();
        store.save_persona_outcomes(running.id, &outcomes).unwrap();
        assert_eq!(store.list_persona_outcomes(running.id).unwrap(), outcomes);
        assert!(matches!(
            store.save_persona_outcomes(running.id, &outcomes),
            Err(StoreError::Integrity(_))
        ));

        assert!(store.get_run(RunId::new()).unwrap().is_none());
        assert!(store.list_persona_outcomes(RunId::new()).unwrap().is_empty());
    }
    /// Two writers released together: exactly one winner and one root may land.
    pub fn racing_writers<S: ExplorationStore + ?Sized>(store: &S) {
        for _ in 0..50 {
            let (exploration, [_, a, b, _]) = seeded_tree(store);
            let barrier = Barrier::new(2);

            let results: Vec<Result<(), StoreError>> = std::thread::scope(|scope| {
                let handles: Vec<_> = [a.id, b.id]
                    .into_iter()
                    .map(|id| {
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            store.update_node_status(id, NodeStatus::Winner)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert_eq!(store.status_counts(exploration.id).unwrap().winner, 1);
        }

        for _ in 0..50 {
            let exploration = exploration();
            store.create_exploration(&exploration).unwrap();
            let roots = [node(exploration.id, None, Some(0.3), 0), node(exploration.id, None, Some(0.3), 1)];
            let barrier = Barrier::new(2);

            let inserted = std::thread::scope(|scope| {
                let handles: Vec<_> = roots
                    .iter()
                    .map(|root| {
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            store.insert_node(root).is_ok()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count()
            });

            assert_eq!(inserted, 1);
            assert_eq!(store.list_nodes(exploration.id).unwrap().len(), 1);
        }
    }
}
