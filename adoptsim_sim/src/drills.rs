//! Named exploration drills.

use serde::Serialize;

/// Drill identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillId {
    /// DRILL-001: heuristic proposer climbing from a heavy scorecard
    SteadyClimb,

    /// DRILL-002: baseline already meets the goal
    InstantWin,

    /// DRILL-003: goal out of reach within the budget
    UnreachableGoal,

    /// DRILL-004: proposer that errors and garbles answers
    FlakyProposer,

    /// DRILL-005: proposer that answers after the timeout
    SlowProposer,

    /// DRILL-006: every answer is malformed
    MalformedFlood,
}

impl DrillId {
    /// Returns a list of all drills.
    pub fn all() -> Vec<DrillId> {
        vec![
            DrillId::SteadyClimb,
            DrillId::InstantWin,
            DrillId::UnreachableGoal,
            DrillId::FlakyProposer,
            DrillId::SlowProposer,
            DrillId::MalformedFlood,
        ]
    }

    /// Returns the drill name.
    pub fn name(&self) -> &'static str {
        match self {
            DrillId::SteadyClimb => "steady_climb",
            DrillId::InstantWin => "instant_win",
            DrillId::UnreachableGoal => "unreachable_goal",
            DrillId::FlakyProposer => "flaky_proposer",
            DrillId::SlowProposer => "slow_proposer",
            DrillId::MalformedFlood => "malformed_flood",
        }
    }

    /// Returns a description of the drill.
    pub fn description(&self) -> &'static str {
        match self {
            DrillId::SteadyClimb => "Heuristic proposals from a heavy scorecard must beat the baseline",
            DrillId::InstantWin => "Goal at or below the baseline, root wins without a proposal",
            DrillId::UnreachableGoal => "Perfect adoption demanded, search must exhaust its budget",
            DrillId::FlakyProposer => "30% transport errors and 20% garbage, every fault becomes a dominated node",
            DrillId::SlowProposer => "Half the answers arrive after the timeout",
            DrillId::MalformedFlood => "Nothing but malformed payloads, root stays active and the search exhausts",
        }
    }

    /// Returns true if the drill injects proposer faults.
    pub fn injects_faults(&self) -> bool {
        matches!(
            self,
            DrillId::FlakyProposer | DrillId::SlowProposer | DrillId::MalformedFlood
        )
    }
}

impl std::fmt::Display for DrillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DrillId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_climb" | "steadyclimb" | "drill-001" => Ok(DrillId::SteadyClimb),
            "instant_win" | "instantwin" | "drill-002" => Ok(DrillId::InstantWin),
            "unreachable_goal" | "unreachablegoal" | "drill-003" => Ok(DrillId::UnreachableGoal),
            "flaky_proposer" | "flakyproposer" | "drill-004" => Ok(DrillId::FlakyProposer),
            "slow_proposer" | "slowproposer" | "drill-005" => Ok(DrillId::SlowProposer),
            "malformed_flood" | "malformedflood" | "drill-006" => Ok(DrillId::MalformedFlood),
            _ => Err(format!("Unknown drill: {}", s)),
        }
    }
}
