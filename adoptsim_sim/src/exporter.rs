//! JSON exporter for exploration trees.
//!
//! Dumps a persisted exploration with every node, every run behind a node
//! and the summary paths, for offline inspection or plotting.

use adoptsim_core::{
    summarize, Exploration, ExplorationStore, PathStep, ScenarioNode, SimulationRun, StatusCounts, StoreError,
};
use adoptsim_env::ExplorationId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete exploration export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationExport {
    pub exploration: Exploration,

    pub counts: StatusCounts,

    /// Nodes in creation order
    pub nodes: Vec<ScenarioNode>,

    /// Baseline run first, then one run per simulated node
    pub runs: Vec<SimulationRun>,

    pub best_path: Vec<PathStep>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_path: Option<Vec<PathStep>>,
}

impl ExplorationExport {
    /// Collects an exploration from the store.
    pub fn from_store(
        store: &(impl ExplorationStore + ?Sized),
        exploration_id: ExplorationId,
    ) -> Result<Self, StoreError> {
        let summary = summarize(store, exploration_id)?;
        let nodes = store.list_nodes(exploration_id)?;

        let mut runs = Vec::with_capacity(nodes.len());
        for run_id in nodes.iter().filter_map(|n| n.simulation_results.map(|r| r.run_id)) {
            let run = store.get_run(run_id)?.ok_or(StoreError::RunNotFound(run_id))?;
            runs.push(run);
        }

        Ok(Self {
            exploration: summary.exploration,
            counts: summary.counts,
            nodes,
            runs,
            best_path: summary.best_path,
            winner_path: summary.winner_path,
        })
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VirtualContext;
    use crate::population::uniform_population;
    use crate::proposers::HeuristicProposer;
    use adoptsim_core::{
        Calibration, Collaborators, ExplorationConfig, ExplorationEngine, ExplorationRequest, LatentTraits,
        MemoryExplorationStore, ScenarioTable, SimulationConfig, Simulator,
    };
    use adoptsim_env::ScorecardParams;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_export_contains_every_node_and_run() {
        let store = Arc::new(MemoryExplorationStore::new());
        let collaborators = Collaborators {
            ctx: VirtualContext::shared(5),
            proposer: Arc::new(HeuristicProposer::default()),
            store: store.clone(),
            simulator: Simulator::new(&Calibration::default()),
            population: uniform_population(20, LatentTraits::uniform(0.5)).into(),
        };
        let mut engine = ExplorationEngine::start(
            collaborators,
            &ScenarioTable::builtin(),
            ExplorationRequest::new(
                ScorecardParams::uniform(0.6),
                0.99,
                ExplorationConfig {
                    max_total_nodes: 5,
                    simulation: SimulationConfig::seeded(50, 0.1, 5),
                    ..Default::default()
                },
            ),
        )
        .unwrap();
        let finished = engine.run().await.unwrap();

        let export = ExplorationExport::from_store(store.as_ref(), finished.id).unwrap();

        assert_eq!(export.nodes.len(), 5);
        assert_eq!(export.runs.len(), 5);
        assert_eq!(export.runs[0].id, finished.baseline_analysis_id);
        assert_eq!(export.counts.total(), 5);

        let parsed: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        assert_eq!(parsed["nodes"].as_array().unwrap().len(), 5);
        assert_eq!(parsed["exploration"]["status"], "exhausted");
        assert!(parsed.get("winner_path").is_none());
    }
}
