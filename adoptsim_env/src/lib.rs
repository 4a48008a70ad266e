//! adoptsim Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam between the pure adoptsim engines
//! and the outside world, so the same exploration code runs in
//! **Production** (tokio, OS entropy, real proposal services) and in the
//! **Deterministic Harness** (virtual clock, seeded entropy, scripted proposers).
//!
//! # Core Concept
//!
//! Everything the engines cannot compute themselves is intercepted here:
//! - Time (`now()`, `wall_clock()`, `sleep()`)
//! - Entropy (`derive_seed()`)
//! - Design-change proposals (`ActionProposer::propose_action()`)
//!
//! By deriving all entropy from a single 64-bit seed, any exploration becomes
//! reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use adoptsim_env::{AdoptsimContext, ActionProposer, ProposalRequest};
//!
//! async fn expand<Ctx: AdoptsimContext, P: ActionProposer>(ctx: &Ctx, proposer: &P, req: &ProposalRequest) {
//!     let started = ctx.now();
//!     let proposal = proposer.propose_action(req).await;
//!     let elapsed = ctx.now() - started;
//! }
//! ```

mod context;
mod error;
mod proposal;
mod tokio_impl;
mod types;

pub use context::AdoptsimContext;
pub use error::EnvError;
pub use proposal::{ActionProposer, Proposal, ProposalRequest, ProposedAction};
pub use tokio_impl::TokioContext;
pub use types::{
    DimensionDeltas, ExperimentId, ExplorationId, NodeId, PersonaId, RunId, ScorecardId,
    ScorecardParams,
};
