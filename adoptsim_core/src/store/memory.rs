//! In-memory store backend.

use adoptsim_env::{ExplorationId, NodeId, RunId};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{check_parent, ExplorationStore};
use crate::error::StoreError;
use crate::exploration::{Exploration, NodeStatus, ScenarioNode};
use crate::simulation::{PersonaOutcome, SimulationRun};

#[derive(Default)]
struct Tables {
    explorations: HashMap<ExplorationId, Exploration>,
    exploration_order: Vec<ExplorationId>,
    nodes: HashMap<NodeId, ScenarioNode>,
    /// Node ids per exploration in insertion order
    node_order: HashMap<ExplorationId, Vec<NodeId>>,
    children: HashMap<NodeId, Vec<NodeId>>,
    winners: HashMap<ExplorationId, NodeId>,
    runs: HashMap<RunId, SimulationRun>,
    outcomes: HashMap<RunId, Vec<PersonaOutcome>>,
}

/// Volatile store guarded by a single read-write lock.
///
/// Used by tests, the drill harness and one-shot CLI runs.
#[derive(Default)]
pub struct MemoryExplorationStore {
    tables: RwLock<Tables>,
}

impl MemoryExplorationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExplorationStore for MemoryExplorationStore {
    fn create_exploration(&self, exploration: &Exploration) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.explorations.contains_key(&exploration.id) {
            return Err(StoreError::Integrity(format!(
                "exploration {} already exists",
                exploration.id
            )));
        }
        tables.exploration_order.push(exploration.id);
        tables.explorations.insert(exploration.id, exploration.clone());
        Ok(())
    }

    fn update_exploration(&self, exploration: &Exploration) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let slot = tables
            .explorations
            .get_mut(&exploration.id)
            .ok_or(StoreError::ExplorationNotFound(exploration.id))?;
        *slot = exploration.clone();
        Ok(())
    }

    fn get_exploration(&self, id: ExplorationId) -> Result<Option<Exploration>, StoreError> {
        Ok(self.tables.read().explorations.get(&id).cloned())
    }

    fn list_explorations(&self) -> Result<Vec<Exploration>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .exploration_order
            .iter()
            .filter_map(|id| tables.explorations.get(id).cloned())
            .collect())
    }

    fn insert_node(&self, node: &ScenarioNode) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        if !tables.explorations.contains_key(&node.exploration_id) {
            return Err(StoreError::ExplorationNotFound(node.exploration_id));
        }
        if tables.nodes.contains_key(&node.id) {
            return Err(StoreError::Integrity(format!("node {} already exists", node.id)));
        }
        let parent = node.parent_id.and_then(|id| tables.nodes.get(&id));
        check_parent(node, parent)?;

        if node.is_root() {
            let has_root = tables
                .node_order
                .get(&node.exploration_id)
                .map(|ids| ids.iter().any(|id| tables.nodes.get(id).is_some_and(ScenarioNode::is_root)))
                .unwrap_or(false);
            if has_root {
                return Err(StoreError::Integrity(format!(
                    "exploration {} already has a root",
                    node.exploration_id
                )));
            }
        }
        if node.node_status == NodeStatus::Winner && tables.winners.contains_key(&node.exploration_id) {
            return Err(StoreError::Integrity(format!(
                "exploration {} already has a winner",
                node.exploration_id
            )));
        }

        if let Some(parent_id) = node.parent_id {
            tables.children.entry(parent_id).or_default().push(node.id);
        }
        if node.node_status == NodeStatus::Winner {
            tables.winners.insert(node.exploration_id, node.id);
        }
        tables.node_order.entry(node.exploration_id).or_default().push(node.id);
        tables.nodes.insert(node.id, node.clone());
        Ok(())
    }

    fn update_node_status(&self, id: NodeId, status: NodeStatus) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let exploration_id = tables
            .nodes
            .get(&id)
            .map(|n| n.exploration_id)
            .ok_or(StoreError::NodeNotFound(id))?;

        match tables.winners.get(&exploration_id).copied() {
            Some(winner) if status == NodeStatus::Winner && winner != id => {
                return Err(StoreError::Integrity(format!(
                    "exploration {} already has winner {}",
                    exploration_id, winner
                )));
            }
            Some(winner) if status != NodeStatus::Winner && winner == id => {
                tables.winners.remove(&exploration_id);
            }
            _ => {}
        }
        if status == NodeStatus::Winner {
            tables.winners.insert(exploration_id, id);
        }
        if let Some(node) = tables.nodes.get_mut(&id) {
            node.node_status = status;
        }
        Ok(())
    }

    fn get_node(&self, id: NodeId) -> Result<Option<ScenarioNode>, StoreError> {
        Ok(self.tables.read().nodes.get(&id).cloned())
    }

    fn list_nodes(&self, exploration_id: ExplorationId) -> Result<Vec<ScenarioNode>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .node_order
            .get(&exploration_id)
            .map(|ids| ids.iter().filter_map(|id| tables.nodes.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn list_children(&self, parent_id: NodeId) -> Result<Vec<ScenarioNode>, StoreError> {
        let tables = self.tables.read();
        if !tables.nodes.contains_key(&parent_id) {
            return Err(StoreError::NodeNotFound(parent_id));
        }
        Ok(tables
            .children
            .get(&parent_id)
            .map(|ids| ids.iter().filter_map(|id| tables.nodes.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn get_winner(&self, exploration_id: ExplorationId) -> Result<Option<ScenarioNode>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .winners
            .get(&exploration_id)
            .and_then(|id| tables.nodes.get(id).cloned()))
    }

    fn save_run(&self, run: &SimulationRun) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.runs.get(&run.id) {
            if existing.is_finished() {
                return Err(StoreError::Integrity(format!("run {} is already finished", run.id)));
            }
        }
        tables.runs.insert(run.id, run.clone());
        Ok(())
    }

    fn get_run(&self, id: RunId) -> Result<Option<SimulationRun>, StoreError> {
        Ok(self.tables.read().runs.get(&id).cloned())
    }

    fn save_persona_outcomes(&self, run_id: RunId, outcomes: &[PersonaOutcome]) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.outcomes.contains_key(&run_id) {
            return Err(StoreError::Integrity(format!("outcomes for run {} already saved", run_id)));
        }
        tables.outcomes.insert(run_id, outcomes.to_vec());
        Ok(())
    }

    fn list_persona_outcomes(&self, run_id: RunId) -> Result<Vec<PersonaOutcome>, StoreError> {
        Ok(self.tables.read().outcomes.get(&run_id).cloned().unwrap_or_default())
    }
}
