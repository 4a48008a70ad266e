//! Adoptsim Deterministic Drill Harness
//!
//! This crate runs the exploration engine inside a controlled world where
//! every run is reproducible from a single 64-bit seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: virtual clock, advanced only by proposer latency
//! - **Proposals**: rule-based proposer, optionally wrapped in fault injection
//! - **Randomness**: populations, simulation streams and faults all derive from the seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      DrillRunner                         │
//! │  ┌────────────────┐   ┌──────────────────────────────┐   │
//! │  │ VirtualContext │   │ SyntheticPopulation (seeded) │   │
//! │  └───────┬────────┘   └──────────────┬───────────────┘   │
//! │          │                           │                   │
//! │  ┌───────▼───────────────────────────▼───────────────┐   │
//! │  │               ExplorationEngine                   │   │
//! │  └───────┬───────────────────────────┬───────────────┘   │
//! │          │                           │                   │
//! │  ┌───────▼────────┐          ┌───────▼──────────────┐    │
//! │  │ ChaosProposer  │          │ MemoryExplorationStore│   │
//! │  │  └ Heuristic   │          └──────────────────────┘    │
//! │  └────────────────┘                                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use adoptsim_sim::{DrillId, DrillRunner};
//!
//! let runner = DrillRunner::new(42, 200);
//! let result = runner.run(DrillId::FlakyProposer).await;
//! assert!(result.passed);
//! ```

mod context;
pub mod drills;
mod exporter;
mod population;
mod proposers;
mod runner;

pub use context::VirtualContext;
pub use drills::DrillId;
pub use exporter::ExplorationExport;
pub use population::{uniform_population, Archetype, SyntheticPopulation};
pub use proposers::{ChaosConfig, ChaosProposer, ChaosStats, HeuristicProposer};
pub use runner::{DrillError, DrillResult, DrillRunner};
