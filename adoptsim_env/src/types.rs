//! Common types shared between the engines and the environment boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from a UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Creates a deterministic identifier from a seed (for the harness).
            pub fn from_seed(seed: u64) -> Self {
                let mut bytes = [0u8; 16];
                bytes[0..8].copy_from_slice(&seed.to_le_bytes());
                bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
                Self(Uuid::from_bytes(bytes))
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of one exploration session.
    ExplorationId
);
define_id!(
    /// Identifier of a node in an exploration tree.
    NodeId
);
define_id!(
    /// Identifier of one simulation run.
    RunId
);
define_id!(
    /// Identifier of a synthetic persona.
    PersonaId
);
define_id!(
    /// Identifier of a feature scorecard.
    ScorecardId
);
define_id!(
    /// Identifier of the experiment an exploration belongs to.
    ExperimentId
);

/// The four numeric scorecard dimensions consumed by the simulator.
///
/// Every dimension is a burden score in [0, 1]: higher means harder for the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorecardParams {
    pub complexity: f64,
    pub initial_effort: f64,
    pub perceived_risk: f64,
    pub time_to_value: f64,
}

impl ScorecardParams {
    /// Creates a new parameter set.
    pub fn new(complexity: f64, initial_effort: f64, perceived_risk: f64, time_to_value: f64) -> Self {
        Self {
            complexity,
            initial_effort,
            perceived_risk,
            time_to_value,
        }
    }

    /// All four dimensions set to the same value.
    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value)
    }

    /// Dimensions in canonical order.
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.complexity,
            self.initial_effort,
            self.perceived_risk,
            self.time_to_value,
        ]
    }

    /// Returns true if every dimension is finite and within [0, 1].
    pub fn is_valid(&self) -> bool {
        self.as_array()
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// Applies deltas to every dimension, clamping each to [0, 1].
    pub fn apply(&self, deltas: &DimensionDeltas) -> Self {
        Self {
            complexity: (self.complexity + deltas.complexity).clamp(0.0, 1.0),
            initial_effort: (self.initial_effort + deltas.initial_effort).clamp(0.0, 1.0),
            perceived_risk: (self.perceived_risk + deltas.perceived_risk).clamp(0.0, 1.0),
            time_to_value: (self.time_to_value + deltas.time_to_value).clamp(0.0, 1.0),
        }
    }
}

/// Signed changes a proposed action makes to the scorecard dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionDeltas {
    #[serde(default)]
    pub complexity: f64,
    #[serde(default)]
    pub initial_effort: f64,
    #[serde(default)]
    pub perceived_risk: f64,
    #[serde(default)]
    pub time_to_value: f64,
}

impl DimensionDeltas {
    /// Checks the deltas can be applied to a scorecard.
    ///
    /// Every delta must be finite and within [-1, 1], and at least one must be non-zero.
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("complexity", self.complexity),
            ("initial_effort", self.initial_effort),
            ("perceived_risk", self.perceived_risk),
            ("time_to_value", self.time_to_value),
        ];

        for (name, value) in values {
            if !value.is_finite() {
                return Err(format!("{} delta is not finite", name));
            }
            if !(-1.0..=1.0).contains(&value) {
                return Err(format!("{} delta {} outside [-1, 1]", name, value));
            }
        }

        if values.iter().all(|(_, v)| *v == 0.0) {
            return Err("action changes no dimension".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_seed_is_deterministic() {
        assert_eq!(NodeId::from_seed(7), NodeId::from_seed(7));
        assert_ne!(NodeId::from_seed(7), NodeId::from_seed(8));
    }

    #[test]
    fn test_id_parse_roundtrip() {
        let id = ExplorationId::new();
        let parsed: ExplorationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_apply_clamps_to_unit_interval() {
        let params = ScorecardParams::new(0.1, 0.9, 0.5, 0.5);
        let deltas = DimensionDeltas {
            complexity: -0.3,
            initial_effort: 0.4,
            perceived_risk: -0.1,
            time_to_value: 0.0,
        };

        let next = params.apply(&deltas);
        assert_eq!(next.complexity, 0.0);
        assert_eq!(next.initial_effort, 1.0);
        assert!((next.perceived_risk - 0.4).abs() < 1e-12);
        assert_eq!(next.time_to_value, 0.5);
    }

    #[test]
    fn test_deltas_validation() {
        assert!(DimensionDeltas::default().validate().is_err());

        let nan = DimensionDeltas {
            complexity: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());

        let too_big = DimensionDeltas {
            perceived_risk: -1.5,
            ..Default::default()
        };
        assert!(too_big.validate().is_err());

        let ok = DimensionDeltas {
            time_to_value: -0.2,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_params_validity() {
        assert!(ScorecardParams::uniform(0.5).is_valid());
        assert!(!ScorecardParams::new(1.2, 0.0, 0.0, 0.0).is_valid());
        assert!(!ScorecardParams::new(f64::NAN, 0.0, 0.0, 0.0).is_valid());
    }
}
