//! Read-only reporting over a persisted exploration.

use adoptsim_env::{ExplorationId, NodeId};
use serde::{Deserialize, Serialize};

use super::{Exploration, ScenarioNode};
use crate::error::StoreError;
use crate::store::{ExplorationStore, StatusCounts};

/// One node on a root→node path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub node_id: NodeId,
    pub depth: u32,

    /// Action that produced the node; `None` for the root
    pub action: Option<String>,

    pub success_rate: Option<f64>,
}

impl From<&ScenarioNode> for PathStep {
    fn from(node: &ScenarioNode) -> Self {
        Self {
            node_id: node.id,
            depth: node.depth,
            action: node.action_applied.clone(),
            success_rate: node.success_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationSummary {
    pub exploration: Exploration,
    pub counts: StatusCounts,

    /// Path to the node with the highest success rate
    pub best_path: Vec<PathStep>,

    /// Path to the winner, once there is one
    pub winner_path: Option<Vec<PathStep>>,
}

impl ExplorationSummary {
    /// Actions along the best path, root excluded.
    pub fn best_actions(&self) -> Vec<&str> {
        self.best_path.iter().filter_map(|s| s.action.as_deref()).collect()
    }
}

fn path_to(store: &(impl ExplorationStore + ?Sized), node_id: NodeId) -> Result<Vec<PathStep>, StoreError> {
    Ok(store.ancestor_path(node_id)?.iter().map(PathStep::from).collect())
}

/// Builds a summary from store queries only.
///
/// Safe to call while the owning engine is still stepping.
pub fn summarize(
    store: &(impl ExplorationStore + ?Sized),
    exploration_id: ExplorationId,
) -> Result<ExplorationSummary, StoreError> {
    let exploration = store
        .get_exploration(exploration_id)?
        .ok_or(StoreError::ExplorationNotFound(exploration_id))?;

    let best_path = match store.best_node(exploration_id)? {
        Some(best) => path_to(store, best.id)?,
        None => Vec::new(),
    };
    let winner_path = match store.get_winner(exploration_id)? {
        Some(winner) => Some(path_to(store, winner.id)?),
        None => None,
    };

    Ok(ExplorationSummary {
        counts: store.status_counts(exploration_id)?,
        exploration,
        best_path,
        winner_path,
    })
}
