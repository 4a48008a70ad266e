//! Adoptsim CLI
//!
//! Simulate feature adoption, explore design changes towards a goal, and run
//! the deterministic drills.

use adoptsim_core::{
    summarize, Calibration, Collaborators, ConfigError, ExplorationConfig, ExplorationEngine, ExplorationError,
    ExplorationRequest, ExplorationStore, MemoryExplorationStore, Persona, RunResult, ScenarioTable, SimError,
    SimulationConfig, Simulator, SledExplorationStore, StoreError,
};
use adoptsim_env::{ExplorationId, ScorecardId, ScorecardParams, TokioContext};
use adoptsim_sim::{DrillId, DrillResult, DrillRunner, ExplorationExport, HeuristicProposer, SyntheticPopulation};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Simulation(#[from] SimError),

    #[error(transparent)]
    Exploration(#[from] ExplorationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Adoptsim - persona-based adoption simulator
#[derive(Parser, Debug)]
#[command(name = "adoptsim")]
#[command(about = "Simulate feature adoption and search for design changes that reach a goal", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one Monte Carlo evaluation of a scorecard
    Simulate(SimulateArgs),

    /// Search for design changes that reach an adoption goal
    Explore(ExploreArgs),

    /// Run deterministic drills against the exploration engine
    Drill(DrillArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Master seed (0 = fresh entropy)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of synthetic personas
    #[arg(short, long, default_value = "200")]
    personas: usize,

    /// Executions per persona
    #[arg(short = 'n', long, default_value = "100")]
    executions: usize,

    /// Trait noise standard deviation
    #[arg(long, default_value = "0.1")]
    sigma: f64,

    /// Scenario id, or "all" to compare every scenario
    #[arg(short = 'S', long, default_value = "baseline")]
    scenario: String,

    #[arg(long, default_value = "0.5")]
    complexity: f64,

    #[arg(long, default_value = "0.5")]
    initial_effort: f64,

    #[arg(long, default_value = "0.5")]
    perceived_risk: f64,

    #[arg(long, default_value = "0.5")]
    time_to_value: f64,

    /// Calibration JSON file
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Scenario table JSON file
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// JSON output
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExploreArgs {
    #[command(flatten)]
    sim: SimulateArgs,

    /// Target success rate
    #[arg(short, long, default_value = "0.6")]
    goal: f64,

    #[arg(long, default_value = "5")]
    max_depth: u32,

    #[arg(long, default_value = "3")]
    max_children: u32,

    #[arg(long, default_value = "50")]
    max_nodes: u32,

    #[arg(long, default_value = "60")]
    max_calls: u32,

    #[arg(long, default_value = "0.01")]
    min_improvement: f64,

    /// Proposal timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Per-step burden reduction of the heuristic proposer
    #[arg(long, default_value = "0.15")]
    step: f64,

    /// Persist to a sled database at this path (in-memory otherwise)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Resume an exploration from the store
    #[arg(long)]
    resume: Option<ExplorationId>,

    /// Export the finished tree to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DrillArgs {
    /// Drill to run (steady_climb, instant_win, unreachable_goal, flaky_proposer, slow_proposer, malformed_flood, all)
    #[arg(short, long, default_value = "all")]
    drill: String,

    /// Master seed (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    #[arg(short, long, default_value = "100")]
    personas: usize,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let outcome = match cli.command {
        Command::Simulate(args) => simulate(args),
        Command::Explore(args) => explore(args).await,
        Command::Drill(args) => drill(args).await,
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn load_tables(args: &SimulateArgs) -> Result<(Calibration, ScenarioTable), ConfigError> {
    let calibration = match &args.calibration {
        Some(path) => Calibration::load(path)?,
        None => Calibration::default(),
    };
    let scenarios = match &args.scenarios {
        Some(path) => ScenarioTable::load(path)?,
        None => ScenarioTable::builtin(),
    };
    Ok((calibration, scenarios))
}

fn seed_or_entropy(seed: u64) -> Option<u64> {
    (seed != 0).then_some(seed)
}

fn scorecard(args: &SimulateArgs) -> ScorecardParams {
    ScorecardParams::new(args.complexity, args.initial_effort, args.perceived_risk, args.time_to_value)
}

fn simulation_config(args: &SimulateArgs) -> SimulationConfig {
    SimulationConfig {
        n_synths: 0,
        n_executions: args.executions,
        sigma: args.sigma,
        seed: seed_or_entropy(args.seed),
    }
}

fn population_seed(args: &SimulateArgs) -> u64 {
    seed_or_entropy(args.seed).unwrap_or_else(rand::random::<u64>)
}

fn population(seed: u64, size: usize, calibration: &Calibration) -> Result<Vec<Persona>, ConfigError> {
    SyntheticPopulation::with_weights(seed, calibration.trait_weights.clone()).personas(size)
}

fn report_run(result: &RunResult) {
    let outcomes = &result.run.aggregated_outcomes;
    info!(
        "{:<14} success={:.3} failed={:.3} did_not_try={:.3} (p50={:.3}, {} personas)",
        result.run.scenario_id,
        outcomes.success,
        outcomes.failed,
        outcomes.did_not_try,
        result.success_distribution.median,
        result.run.total_synths,
    );
}

fn simulate(args: SimulateArgs) -> Result<bool, CliError> {
    let (calibration, scenarios) = load_tables(&args)?;
    let personas = population(population_seed(&args), args.personas, &calibration)?;
    let simulator = Simulator::new(&calibration);
    let params = scorecard(&args);
    let config = simulation_config(&args);

    let results = if args.scenario == "all" {
        let all = scenarios
            .ids()
            .into_iter()
            .map(|id| scenarios.get(id))
            .collect::<Result<Vec<_>, _>>()?;
        simulator.compare_scenarios(&personas, ScorecardId::new(), &params, &all, &config)?
    } else {
        let scenario = scenarios.get(&args.scenario)?;
        vec![simulator.simulate(&personas, ScorecardId::new(), &params, scenario, &config)?]
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            report_run(result);
        }
    }
    Ok(true)
}

async fn explore(args: ExploreArgs) -> Result<bool, CliError> {
    let (calibration, scenarios) = load_tables(&args.sim)?;

    let store: Arc<dyn ExplorationStore> = match &args.store {
        Some(path) => Arc::new(SledExplorationStore::open(path)?),
        None => Arc::new(MemoryExplorationStore::new()),
    };

    // A resumed tree must be evaluated on the personas it started with
    let (personas, seed) = match args.resume {
        Some(id) => {
            let stored = store.get_exploration(id)?.ok_or(StoreError::ExplorationNotFound(id))?;
            let seed = stored.population.seed.ok_or_else(|| {
                ConfigError::Invalid(format!("exploration {} has no recorded population seed", id))
            })?;
            info!("Rebuilding {} personas from seed {}", stored.population.size, seed);
            (population(seed, stored.population.size, &calibration)?, seed)
        }
        None => {
            let seed = population_seed(&args.sim);
            (population(seed, args.sim.personas, &calibration)?, seed)
        }
    };

    let collaborators = Collaborators {
        ctx: TokioContext::shared(),
        proposer: Arc::new(HeuristicProposer::new(args.step)),
        store: store.clone(),
        simulator: Simulator::new(&calibration),
        population: personas.into(),
    };

    let mut engine = match args.resume {
        Some(id) => {
            info!("Resuming exploration {}", id);
            ExplorationEngine::resume(collaborators, &scenarios, id)?
        }
        None => {
            let config = ExplorationConfig {
                max_depth: args.max_depth,
                max_children_per_node: args.max_children,
                max_total_nodes: args.max_nodes,
                max_external_calls: args.max_calls,
                min_improvement: args.min_improvement,
                proposal_timeout_ms: args.timeout_ms,
                scenario_id: args.sim.scenario.clone(),
                simulation: simulation_config(&args.sim),
            };
            let request = ExplorationRequest::new(scorecard(&args.sim), args.goal, config).with_population_seed(seed);
            ExplorationEngine::start(collaborators, &scenarios, request)?
        }
    };

    let exploration = engine.run().await?;
    let summary = summarize(store.as_ref(), exploration.id)?;

    if args.sim.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "Exploration {} {:?}: {} nodes ({} active, {} dominated), {} calls, best={:.3}",
            exploration.id,
            exploration.status,
            exploration.total_nodes,
            summary.counts.active,
            summary.counts.dominated,
            exploration.total_external_calls,
            exploration.best_success_rate,
        );
        let path = summary.winner_path.as_ref().unwrap_or(&summary.best_path);
        for step in path {
            info!(
                "  [{}] {:<45} success={}",
                step.depth,
                step.action.as_deref().unwrap_or("(baseline)"),
                step.success_rate.map_or_else(|| "-".to_string(), |r| format!("{:.3}", r)),
            );
        }
    }

    if let Some(path) = &args.export {
        let export = ExplorationExport::from_store(store.as_ref(), exploration.id)?;
        export.write_to_file(path)?;
        info!("Exported {} nodes to {}", export.nodes.len(), path.display());
    }

    Ok(true)
}

async fn drill(args: DrillArgs) -> Result<bool, CliError> {
    let drills: Vec<DrillId> = if args.drill == "all" {
        DrillId::all()
    } else {
        vec![args
            .drill
            .parse()
            .map_err(|e: String| ConfigError::Invalid(e))?]
    };

    let base_seed = if args.seed == 0 {
        rand::random::<u64>()
    } else {
        args.seed
    };

    if !args.json {
        info!("Adoptsim drill harness v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let mut results: Vec<DrillResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = DrillRunner::new(seed, args.personas);

        for drill in &drills {
            let result = runner.run(*drill).await;
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", drill.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        drill.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            results.push(result);
        }
    }

    let total = results.len();
    let failed: Vec<&DrillResult> = results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} drill runs passed!", total);
        } else {
            error!("❌ {}/{} drill runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.drill,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed.is_empty())
}
