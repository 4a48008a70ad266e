//! End-to-end runs over the public API.

use adoptsim_core::{
    Calibration, Collaborators, ExplorationConfig, ExplorationEngine, ExplorationError, ExplorationRequest,
    ExplorationStatus, ExplorationStore, NodeStatus, Persona, ScenarioTable, SimulationConfig, Simulator,
    SledExplorationStore, StepOutcome,
};
use adoptsim_env::ScorecardParams;
use adoptsim_sim::{DrillId, DrillRunner, ExplorationExport, HeuristicProposer, SyntheticPopulation, VirtualContext};
use std::sync::Arc;

fn collaborators(store: Arc<SledExplorationStore>, personas: &[Persona]) -> Collaborators<VirtualContext> {
    Collaborators {
        ctx: VirtualContext::shared(21),
        proposer: Arc::new(HeuristicProposer::default()),
        store,
        simulator: Simulator::new(&Calibration::default()),
        population: personas.to_vec().into(),
    }
}

#[tokio::test]
async fn test_exploration_survives_restart() {
    let dir = std::env::temp_dir().join(format!("adoptsim-pipeline-{}", uuid::Uuid::new_v4()));
    let personas = SyntheticPopulation::generate(21, 40).unwrap();
    let scenarios = ScenarioTable::builtin();

    let exploration_id = {
        let store = Arc::new(SledExplorationStore::open(&dir).unwrap());
        let request = ExplorationRequest::new(
            ScorecardParams::uniform(0.7),
            0.99,
            ExplorationConfig {
                max_total_nodes: 6,
                simulation: SimulationConfig::seeded(50, 0.1, 21),
                ..Default::default()
            },
        )
        .with_population_seed(21);
        let mut engine = ExplorationEngine::start(collaborators(store, &personas), &scenarios, request).unwrap();

        for _ in 0..2 {
            let outcome = engine.step().await.unwrap();
            assert!(matches!(outcome, StepOutcome::Expanded { .. }));
        }
        engine.id()
    };

    let store = Arc::new(SledExplorationStore::open(&dir).unwrap());
    let stored = store.get_exploration(exploration_id).unwrap().unwrap();
    assert_eq!(stored.status, ExplorationStatus::Running);
    assert_eq!(stored.total_nodes, 3);
    assert_eq!(stored.population.size, 40);

    // A restarted process rebuilds the personas from the recorded seed
    let seed = stored.population.seed.unwrap();
    let personas = SyntheticPopulation::generate(seed, stored.population.size).unwrap();
    let other = SyntheticPopulation::generate(seed + 1, stored.population.size).unwrap();
    assert!(matches!(
        ExplorationEngine::resume(collaborators(store.clone(), &other), &scenarios, exploration_id),
        Err(ExplorationError::PopulationMismatch { .. })
    ));

    let mut engine = ExplorationEngine::resume(collaborators(store.clone(), &personas), &scenarios, exploration_id).unwrap();
    let finished = engine.run().await.unwrap();

    assert_eq!(finished.status, ExplorationStatus::Exhausted);
    assert_eq!(finished.total_nodes, 6);
    assert!(store.get_winner(exploration_id).unwrap().is_none());

    let export = ExplorationExport::from_store(store.as_ref(), exploration_id).unwrap();
    assert_eq!(export.nodes.len(), 6);
    assert_eq!(export.runs.len(), 6);
    assert_eq!(export.counts.winner, 0);
    assert_eq!(export.best_path.first().map(|s| s.depth), Some(0));

    let again = ExplorationEngine::resume(collaborators(store.clone(), &personas), &scenarios, exploration_id);
    assert!(matches!(again, Err(ExplorationError::AlreadyFinished(id)) if id == exploration_id));

    drop(engine);
    drop(store);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_heuristic_search_improves_on_baseline() {
    let dir = std::env::temp_dir().join(format!("adoptsim-pipeline-{}", uuid::Uuid::new_v4()));
    let personas = SyntheticPopulation::generate(4, 60).unwrap();
    let store = Arc::new(SledExplorationStore::open(&dir).unwrap());

    let request = ExplorationRequest::new(
        ScorecardParams::new(0.8, 0.6, 0.7, 0.6),
        0.99,
        ExplorationConfig {
            max_total_nodes: 12,
            simulation: SimulationConfig::seeded(50, 0.1, 4),
            ..Default::default()
        },
    );
    let mut engine =
        ExplorationEngine::start(collaborators(store.clone(), &personas), &ScenarioTable::builtin(), request).unwrap();
    let finished = engine.run().await.unwrap();

    let root = store.get_root(finished.id).unwrap().unwrap();
    assert_eq!(root.node_status, NodeStatus::Active);
    assert!(finished.best_success_rate > root.success_rate().unwrap());

    // Lower burden never lowers success under a shared seed
    for node in store.list_nodes(finished.id).unwrap() {
        let path = store.ancestor_path(node.id).unwrap();
        for pair in path.windows(2) {
            if let (Some(parent), Some(child)) = (pair[0].success_rate(), pair[1].success_rate()) {
                assert!(child >= parent);
            }
        }
    }

    drop(engine);
    drop(store);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_all_drills_pass_across_seeds() {
    for seed in [1, 7, 42] {
        let runner = DrillRunner::new(seed, 60).with_executions(50);
        for drill in DrillId::all() {
            let result = runner.run(drill).await;
            assert!(
                result.passed,
                "{} (seed={}) failed: {:?}",
                drill,
                seed,
                result.failure_reason
            );
        }
    }
}
