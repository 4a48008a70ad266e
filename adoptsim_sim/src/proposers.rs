//! Action proposers for drills and offline CLI runs.
//!
//! - [`HeuristicProposer`]: deterministic rules, always attacks the costliest
//!   dimension not yet tried from the node
//! - [`ChaosProposer`]: wraps another proposer and injects failures,
//!   malformed payloads and slow answers from a seeded RNG

use adoptsim_env::{
    ActionProposer, AdoptsimContext, DimensionDeltas, EnvError, Proposal, ProposalRequest, ProposedAction,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One canned design change per scorecard dimension.
struct Playbook {
    dimension: &'static str,
    action: &'static str,
    rationale: &'static str,
}

const PLAYBOOK: [Playbook; 4] = [
    Playbook {
        dimension: "complexity",
        action: "Collapse the workflow into fewer steps",
        rationale: "Fewer decisions per task lowers the capability needed to finish",
    },
    Playbook {
        dimension: "initial_effort",
        action: "Ship sensible defaults and skip setup",
        rationale: "Less upfront work lowers the barrier to a first attempt",
    },
    Playbook {
        dimension: "perceived_risk",
        action: "Add preview and one-click undo",
        rationale: "Reversible actions make wary users willing to try",
    },
    Playbook {
        dimension: "time_to_value",
        action: "Show a useful result on first run",
        rationale: "Early payoff keeps users going through friction",
    },
];

/// Rule-based proposer.
///
/// Picks the highest remaining dimension whose action has not been tried
/// from this node and proposes lowering it by `step`.
pub struct HeuristicProposer {
    step: f64,
}

impl HeuristicProposer {
    pub fn new(step: f64) -> Self {
        Self { step }
    }
}

impl Default for HeuristicProposer {
    fn default() -> Self {
        Self::new(0.15)
    }
}

#[async_trait]
impl ActionProposer for HeuristicProposer {
    async fn propose_action(&self, request: &ProposalRequest) -> Result<Proposal, EnvError> {
        let scores = request.scorecard.as_array();

        let pick = PLAYBOOK
            .iter()
            .zip(scores)
            .enumerate()
            .filter(|(_, (play, score))| *score > 0.0 && !request.tried_actions.iter().any(|t| t == play.action))
            .max_by(|(ia, (_, a)), (ib, (_, b))| a.total_cmp(b).then(ib.cmp(ia)));

        let Some((index, (play, _))) = pick else {
            return Ok(Proposal::Malformed {
                action_text: None,
                rationale: None,
                reason: "every dimension already tried from this node".to_string(),
            });
        };

        let mut deltas = [0.0; 4];
        deltas[index] = -self.step;

        Ok(Proposal::Action(ProposedAction {
            action_text: play.action.to_string(),
            category: Some(play.dimension.to_string()),
            deltas: DimensionDeltas {
                complexity: deltas[0],
                initial_effort: deltas[1],
                perceived_risk: deltas[2],
                time_to_value: deltas[3],
            },
            rationale: play.rationale.to_string(),
        }))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Fault injection settings. Rates are cumulative slices of one roll.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Probability of a transport error
    pub failure_rate: f64,

    /// Probability of a malformed payload
    pub malformed_rate: f64,

    /// Probability of answering after `slow_delay` (real time)
    pub slow_rate: f64,

    pub slow_delay: Duration,

    /// Virtual latency added to every healthy answer
    pub latency: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            malformed_rate: 0.0,
            slow_rate: 0.0,
            slow_delay: Duration::from_millis(200),
            latency: Duration::from_millis(800),
        }
    }
}

/// Counts of injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChaosStats {
    pub calls: u64,
    pub failures: u64,
    pub malformed: u64,
    pub slow: u64,
}

impl ChaosStats {
    pub fn injected(&self) -> u64 {
        self.failures + self.malformed + self.slow
    }
}

enum Fault {
    Failure,
    Malformed,
    Slow,
    None,
}

/// Proposer wrapper that misbehaves on purpose.
pub struct ChaosProposer<Ctx: AdoptsimContext> {
    ctx: Arc<Ctx>,
    inner: Arc<dyn ActionProposer>,
    config: ChaosConfig,
    rng: Mutex<ChaCha8Rng>,
    calls: AtomicU64,
    failures: AtomicU64,
    malformed: AtomicU64,
    slow: AtomicU64,
}

impl<Ctx: AdoptsimContext> ChaosProposer<Ctx> {
    pub fn new(ctx: Arc<Ctx>, inner: Arc<dyn ActionProposer>, config: ChaosConfig) -> Self {
        let seed = ctx.derive_seed(0xC4A05);
        Self {
            ctx,
            inner,
            config,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            slow: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ChaosStats {
        ChaosStats {
            calls: self.calls.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            malformed: self.malformed.load(Ordering::SeqCst),
            slow: self.slow.load(Ordering::SeqCst),
        }
    }

    fn roll(&self) -> Fault {
        let roll: f64 = self.rng.lock().gen();
        let ChaosConfig {
            failure_rate,
            malformed_rate,
            slow_rate,
            ..
        } = self.config;

        if roll < failure_rate {
            Fault::Failure
        } else if roll < failure_rate + malformed_rate {
            Fault::Malformed
        } else if roll < failure_rate + malformed_rate + slow_rate {
            Fault::Slow
        } else {
            Fault::None
        }
    }
}

#[async_trait]
impl<Ctx: AdoptsimContext> ActionProposer for ChaosProposer<Ctx> {
    async fn propose_action(&self, request: &ProposalRequest) -> Result<Proposal, EnvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.roll() {
            Fault::Failure => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                debug!("Chaos: failing proposal for node {}", request.node_id);
                Err(EnvError::transport("injected connection reset"))
            }
            Fault::Malformed => {
                self.malformed.fetch_add(1, Ordering::SeqCst);
                debug!("Chaos: garbling proposal for node {}", request.node_id);
                Ok(Proposal::Malformed {
                    action_text: Some("{\"acton\": \"make it better\"".to_string()),
                    rationale: None,
                    reason: "injected malformed payload".to_string(),
                })
            }
            Fault::Slow => {
                self.slow.fetch_add(1, Ordering::SeqCst);
                debug!("Chaos: stalling proposal for node {}", request.node_id);
                // Stalls on the real timer so the engine's real-time deadline can fire
                tokio::time::sleep(self.config.slow_delay).await;
                self.inner.propose_action(request).await
            }
            Fault::None => {
                self.ctx.sleep(self.config.latency).await;
                self.inner.propose_action(request).await
            }
        }
    }

    fn name(&self) -> &str {
        "chaos"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VirtualContext;
    use adoptsim_env::{ExplorationId, NodeId, ScorecardParams};

    fn request(scorecard: ScorecardParams, tried: &[&str]) -> ProposalRequest {
        ProposalRequest {
            exploration_id: ExplorationId::new(),
            node_id: NodeId::new(),
            depth: 0,
            scorecard,
            goal: 0.6,
            current_success_rate: Some(0.3),
            action_path: Vec::new(),
            tried_actions: tried.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_heuristic_attacks_costliest_dimension() {
        let proposer = HeuristicProposer::default();
        let proposal = proposer
            .propose_action(&request(ScorecardParams::new(0.4, 0.5, 0.8, 0.6), &[]))
            .await
            .unwrap();

        let Proposal::Action(action) = proposal else {
            panic!("expected an action");
        };
        assert_eq!(action.category.as_deref(), Some("perceived_risk"));
        assert_eq!(action.deltas.perceived_risk, -0.15);
        assert_eq!(action.deltas.complexity, 0.0);
        assert!(action.deltas.validate().is_ok());
    }

    #[tokio::test]
    async fn test_heuristic_skips_tried_actions() {
        let proposer = HeuristicProposer::default();
        let tried = [PLAYBOOK[2].action];
        let proposal = proposer
            .propose_action(&request(ScorecardParams::new(0.4, 0.5, 0.8, 0.6), &tried))
            .await
            .unwrap();

        let Proposal::Action(action) = proposal else {
            panic!("expected an action");
        };
        assert_eq!(action.category.as_deref(), Some("time_to_value"));
    }

    #[tokio::test]
    async fn test_heuristic_ties_go_to_first_dimension() {
        let proposal = HeuristicProposer::default()
            .propose_action(&request(ScorecardParams::uniform(0.5), &[]))
            .await
            .unwrap();
        assert_eq!(proposal.action_text(), Some(PLAYBOOK[0].action));
    }

    #[tokio::test]
    async fn test_heuristic_runs_out_of_ideas() {
        let all: Vec<&str> = PLAYBOOK.iter().map(|p| p.action).collect();
        let proposal = HeuristicProposer::default()
            .propose_action(&request(ScorecardParams::uniform(0.5), &all))
            .await
            .unwrap();
        assert!(matches!(proposal, Proposal::Malformed { .. }));

        let flat = HeuristicProposer::default()
            .propose_action(&request(ScorecardParams::uniform(0.0), &[]))
            .await
            .unwrap();
        assert!(matches!(flat, Proposal::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_chaos_always_failing() {
        let ctx = VirtualContext::shared(1);
        let chaos = ChaosProposer::new(
            ctx,
            Arc::new(HeuristicProposer::default()),
            ChaosConfig {
                failure_rate: 1.0,
                ..Default::default()
            },
        );

        for _ in 0..5 {
            let result = chaos.propose_action(&request(ScorecardParams::uniform(0.5), &[])).await;
            assert!(matches!(result, Err(EnvError::Transport(_))));
        }
        assert_eq!(
            chaos.stats(),
            ChaosStats {
                calls: 5,
                failures: 5,
                malformed: 0,
                slow: 0
            }
        );
    }

    #[tokio::test]
    async fn test_chaos_healthy_calls_advance_virtual_time() {
        let ctx = VirtualContext::shared(1);
        let chaos = ChaosProposer::new(ctx.clone(), Arc::new(HeuristicProposer::default()), ChaosConfig::default());

        let result = chaos.propose_action(&request(ScorecardParams::uniform(0.5), &[])).await;

        assert!(matches!(result, Ok(Proposal::Action(_))));
        assert_eq!(ctx.now(), Duration::from_millis(800));
        assert_eq!(chaos.stats().injected(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chaos_stall_runs_on_the_real_timer() {
        let ctx = VirtualContext::shared(1);
        let chaos = ChaosProposer::new(
            ctx.clone(),
            Arc::new(HeuristicProposer::default()),
            ChaosConfig {
                slow_rate: 1.0,
                slow_delay: Duration::from_millis(200),
                ..Default::default()
            },
        );

        let started = tokio::time::Instant::now();
        let result = chaos.propose_action(&request(ScorecardParams::uniform(0.5), &[])).await;

        assert!(matches!(result, Ok(Proposal::Action(_))));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(ctx.now(), Duration::ZERO);
        assert_eq!(chaos.stats().slow, 1);

        // A real-time deadline shorter than the stall expires
        let timed = tokio::time::timeout(
            Duration::from_millis(20),
            chaos.propose_action(&request(ScorecardParams::uniform(0.5), &[])),
        )
        .await;
        assert!(timed.is_err());
    }

    #[tokio::test]
    async fn test_chaos_is_reproducible() {
        let config = ChaosConfig {
            failure_rate: 0.3,
            malformed_rate: 0.3,
            latency: Duration::ZERO,
            ..Default::default()
        };

        let mut runs = Vec::new();
        for _ in 0..2 {
            let chaos = ChaosProposer::new(
                VirtualContext::shared(9),
                Arc::new(HeuristicProposer::default()),
                config.clone(),
            );
            for _ in 0..20 {
                let _ = chaos.propose_action(&request(ScorecardParams::uniform(0.5), &[])).await;
            }
            runs.push(chaos.stats());
        }

        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0].calls, 20);
    }
}
