//! Action-proposal collaborator abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::types::{DimensionDeltas, ExplorationId, NodeId, ScorecardParams};

/// Everything the collaborator is told about the node being expanded.
///
/// # Request Flow
///
/// ```text
/// Engine                      Collaborator
///   |                              |
///   |-- propose_action(req) ------>|
///   |                              |-- [slow, may fail] -->
///   |<----------- Proposal --------|
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub exploration_id: ExplorationId,

    /// Node whose scorecard should be improved
    pub node_id: NodeId,

    /// Depth of that node (root = 0)
    pub depth: u32,

    /// Scorecard of that node
    pub scorecard: ScorecardParams,

    /// Target success rate
    pub goal: f64,

    /// Success rate the node currently achieves, if it was simulated
    pub current_success_rate: Option<f64>,

    /// Actions applied from the root down to this node, in order
    pub action_path: Vec<String>,

    /// Actions already tried as children of this node
    pub tried_actions: Vec<String>,
}

/// A well-formed design change returned by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    /// Human-readable description of the change
    pub action_text: String,

    /// Optional category label (e.g. "onboarding", "copy")
    pub category: Option<String>,

    /// Changes to apply to the parent scorecard
    pub deltas: DimensionDeltas,

    /// Why the collaborator believes this helps
    pub rationale: String,
}

/// The collaborator's answer.
///
/// A `Malformed` proposal is a normal outcome, not an error: the engine
/// records it as a wasted branch and keeps searching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proposal {
    Action(ProposedAction),
    Malformed {
        action_text: Option<String>,
        rationale: Option<String>,
        reason: String,
    },
}

impl Proposal {
    /// Returns the action text, if any was provided.
    pub fn action_text(&self) -> Option<&str> {
        match self {
            Proposal::Action(action) => Some(action.action_text.as_str()),
            Proposal::Malformed { action_text, .. } => action_text.as_deref(),
        }
    }
}

/// Abstraction for the external service that proposes design changes.
///
/// # Implementations
///
/// - **Production**: wraps a text-generation service
/// - **Harness**: rule-based or scripted proposers, optionally with injected chaos
///
/// The call may be slow or fail; the engine bounds it with a timeout.
#[async_trait]
pub trait ActionProposer: Send + Sync {
    /// Proposes one design change for the node described by `request`.
    async fn propose_action(&self, request: &ProposalRequest) -> Result<Proposal, EnvError>;

    /// Returns the name of this proposer (for logging).
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_action_text() {
        let action = Proposal::Action(ProposedAction {
            action_text: "Add guided setup".to_string(),
            category: None,
            deltas: DimensionDeltas {
                initial_effort: -0.1,
                ..Default::default()
            },
            rationale: "fewer steps".to_string(),
        });
        assert_eq!(action.action_text(), Some("Add guided setup"));

        let malformed = Proposal::Malformed {
            action_text: None,
            rationale: None,
            reason: "no deltas".to_string(),
        };
        assert_eq!(malformed.action_text(), None);
    }

    #[test]
    fn test_malformed_keeps_partial_text() {
        let malformed = Proposal::Malformed {
            action_text: Some("Make it simpler somehow".to_string()),
            rationale: Some("users are confused".to_string()),
            reason: "no dimension deltas".to_string(),
        };
        assert_eq!(malformed.action_text(), Some("Make it simpler somehow"));
    }
}
