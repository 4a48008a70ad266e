//! Personas and the Latent Trait Deriver.
//!
//! A persona arrives with five observable scores. The simulator never reads
//! them directly; it works on four behavioural propensities derived through
//! fixed weighted sums:
//!
//! ```text
//! capability        = 0.40·DL + 0.35·STE + 0.15·MA + 0.10·DE
//! trust             = 0.60·STE + 0.40·DL
//! friction_tolerance= 0.40·TA + 0.35·DL + 0.25·STE
//! exploration       = 0.50·DL + 0.30·(1 − STE) + 0.20·TA
//! ```
//!
//! The weights are held as two 4×5 matrices, one applied to the observable
//! vector and one applied to its complement, so every trait is a convex
//! combination and stays in [0, 1].

use adoptsim_env::PersonaId;
use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Weight matrix shape: one row per latent trait, one column per observable score.
pub type WeightMatrix = SMatrix<f64, 4, 5>;

const WEIGHT_TOLERANCE: f64 = 1e-9;

const TRAIT_NAMES: [&str; 4] = [
    "capability_mean",
    "trust_mean",
    "friction_tolerance_mean",
    "exploration_prob",
];

/// The five raw ability/context scores a persona starts with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservableProfile {
    pub digital_literacy: f64,
    pub similar_tool_experience: f64,
    pub motor_ability: f64,
    pub time_availability: f64,
    pub domain_expertise: f64,
}

impl ObservableProfile {
    /// All five scores set to the same value.
    pub fn uniform(value: f64) -> Self {
        Self {
            digital_literacy: value,
            similar_tool_experience: value,
            motor_ability: value,
            time_availability: value,
            domain_expertise: value,
        }
    }

    /// Scores as a column vector in canonical order.
    pub fn as_vector(&self) -> SVector<f64, 5> {
        SVector::<f64, 5>::new(
            self.digital_literacy,
            self.similar_tool_experience,
            self.motor_ability,
            self.time_availability,
            self.domain_expertise,
        )
    }

    /// Rejects non-finite or out-of-range scores.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range("digital_literacy", self.digital_literacy, 0.0, 1.0)?;
        ConfigError::check_range("similar_tool_experience", self.similar_tool_experience, 0.0, 1.0)?;
        ConfigError::check_range("motor_ability", self.motor_ability, 0.0, 1.0)?;
        ConfigError::check_range("time_availability", self.time_availability, 0.0, 1.0)?;
        ConfigError::check_range("domain_expertise", self.domain_expertise, 0.0, 1.0)?;
        Ok(())
    }
}

/// The four behavioural propensities driving the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatentTraits {
    pub capability_mean: f64,
    pub trust_mean: f64,
    pub friction_tolerance_mean: f64,
    pub exploration_prob: f64,
}

impl LatentTraits {
    /// All four traits set to the same value.
    pub fn uniform(value: f64) -> Self {
        Self {
            capability_mean: value,
            trust_mean: value,
            friction_tolerance_mean: value,
            exploration_prob: value,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [
            self.capability_mean,
            self.trust_mean,
            self.friction_tolerance_mean,
            self.exploration_prob,
        ]
    }

    pub fn from_array(values: [f64; 4]) -> Self {
        Self {
            capability_mean: values[0],
            trust_mean: values[1],
            friction_tolerance_mean: values[2],
            exploration_prob: values[3],
        }
    }

    /// Returns true if every trait is a finite number.
    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}

/// Fixed derivation weights.
///
/// Loaded once into the calibration object and passed through every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitWeights {
    /// Weights applied to the observable scores
    direct: WeightMatrix,

    /// Weights applied to `1 - score` (novelty-seeking terms)
    complement: WeightMatrix,
}

impl TraitWeights {
    /// Builds custom weights, checking that each trait's weights sum to 1.0
    /// and that no weight is negative.
    pub fn new(direct: WeightMatrix, complement: WeightMatrix) -> Result<Self, ConfigError> {
        let weights = Self { direct, complement };
        weights.validate()?;
        Ok(weights)
    }

    pub fn direct(&self) -> WeightMatrix {
        self.direct
    }

    pub fn complement(&self) -> WeightMatrix {
        self.complement
    }

    /// Per-trait sum of direct and complement weights.
    pub fn row_sums(&self) -> [f64; 4] {
        let mut sums = [0.0; 4];
        for (row, sum) in sums.iter_mut().enumerate() {
            *sum = self.direct.row(row).sum() + self.complement.row(row).sum();
        }
        sums
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.direct.iter().chain(self.complement.iter()).any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "trait weights must be finite and non-negative".to_string(),
            ));
        }

        for (name, sum) in TRAIT_NAMES.iter().zip(self.row_sums()) {
            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(ConfigError::WeightSum {
                    trait_name: name.to_string(),
                    sum,
                });
            }
        }
        Ok(())
    }

    /// Derives the latent trait profile. Pure and deterministic.
    pub fn derive(&self, profile: &ObservableProfile) -> LatentTraits {
        let obs = profile.as_vector();
        let complement = obs.map(|v| 1.0 - v);
        let traits = self.direct * obs + self.complement * complement;

        LatentTraits::from_array([
            traits[0].clamp(0.0, 1.0),
            traits[1].clamp(0.0, 1.0),
            traits[2].clamp(0.0, 1.0),
            traits[3].clamp(0.0, 1.0),
        ])
    }
}

impl Default for TraitWeights {
    fn default() -> Self {
        // Columns: digital_literacy, similar_tool_experience, motor_ability,
        //          time_availability, domain_expertise
        #[rustfmt::skip]
        let direct = WeightMatrix::new(
            0.40, 0.35, 0.15, 0.00, 0.10, // capability
            0.40, 0.60, 0.00, 0.00, 0.00, // trust
            0.35, 0.25, 0.00, 0.40, 0.00, // friction tolerance
            0.50, 0.00, 0.00, 0.20, 0.00, // exploration
        );
        #[rustfmt::skip]
        let complement = WeightMatrix::new(
            0.00, 0.00, 0.00, 0.00, 0.00,
            0.00, 0.00, 0.00, 0.00, 0.00,
            0.00, 0.00, 0.00, 0.00, 0.00,
            0.00, 0.30, 0.00, 0.00, 0.00, // novelty seeking without established habits
        );
        Self { direct, complement }
    }
}

/// A synthetic persona as supplied by the population source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,

    /// Observable scores, when the source supplied them
    pub observables: Option<ObservableProfile>,

    /// Derived trait profile; required by the simulator
    pub traits: Option<LatentTraits>,
}

impl Persona {
    /// Creates a persona from a precomputed trait profile.
    pub fn with_traits(id: PersonaId, traits: LatentTraits) -> Self {
        Self {
            id,
            observables: None,
            traits: Some(traits),
        }
    }

    /// Creates a persona from observable scores, deriving its traits.
    pub fn from_observables(
        id: PersonaId,
        observables: ObservableProfile,
        weights: &TraitWeights,
    ) -> Result<Self, ConfigError> {
        observables.validate()?;
        Ok(Self {
            id,
            observables: Some(observables),
            traits: Some(weights.derive(&observables)),
        })
    }

    /// Recomputes the trait profile from observables.
    ///
    /// Observables are authoritative; a stored trait profile is only a cache.
    pub fn refresh_traits(&mut self, weights: &TraitWeights) {
        if let Some(observables) = &self.observables {
            self.traits = Some(weights.derive(observables));
        }
    }
}
