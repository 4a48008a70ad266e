//! Situational scenarios and the scenario table.
//!
//! A scenario is a fixed set of modifiers applied uniformly to every persona
//! in a run. Definitions are loaded once, validated only for numeric range,
//! and never change while a simulation runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// Scenario modifiers.
///
/// `motivation`, `trust` and `friction` are signed shifts in [-1, 1];
/// `task_criticality` is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub motivation: f64,
    pub trust: f64,
    pub friction: f64,
    pub task_criticality: f64,
}

impl Scenario {
    /// Creates a scenario with the given modifiers.
    pub fn new(id: &str, motivation: f64, trust: f64, friction: f64, task_criticality: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            motivation,
            trust,
            friction,
            task_criticality,
        }
    }

    /// Adds a human-readable name and description.
    pub fn described(mut self, name: &str, description: &str) -> Self {
        self.name = name.to_string();
        self.description = description.to_string();
        self
    }

    /// Range check of every modifier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_range(&format!("{}.motivation", self.id), self.motivation, -1.0, 1.0)?;
        ConfigError::check_range(&format!("{}.trust", self.id), self.trust, -1.0, 1.0)?;
        ConfigError::check_range(&format!("{}.friction", self.id), self.friction, -1.0, 1.0)?;
        ConfigError::check_range(
            &format!("{}.task_criticality", self.id),
            self.task_criticality,
            0.0,
            1.0,
        )?;
        Ok(())
    }
}

/// Immutable mapping scenario_id → modifiers.
#[derive(Debug, Clone, Default)]
pub struct ScenarioTable {
    scenarios: BTreeMap<String, Scenario>,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    scenarios: Vec<Scenario>,
}

impl ScenarioTable {
    /// Builds a table, validating every scenario and rejecting duplicate ids.
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, ConfigError> {
        let mut table = BTreeMap::new();
        for scenario in scenarios {
            scenario.validate()?;
            if table.contains_key(&scenario.id) {
                return Err(ConfigError::Invalid(format!("duplicate scenario id: {}", scenario.id)));
            }
            table.insert(scenario.id.clone(), scenario);
        }
        Ok(Self { scenarios: table })
    }

    /// Built-in presets.
    pub fn builtin() -> Self {
        let presets = vec![
            Scenario::new("baseline", 0.0, 0.0, 0.0, 0.5)
                .described("Baseline", "Neutral context, moderately important task"),
            Scenario::new("first_use", 0.2, -0.2, 0.2, 0.3)
                .described("First use", "Curious but unfamiliar users meeting the feature for the first time"),
            Scenario::new("time_pressure", -0.1, 0.0, 0.5, 0.7)
                .described("Time pressure", "Users squeezed for time on an important task"),
            Scenario::new("high_stakes", 0.3, -0.3, 0.1, 1.0)
                .described("High stakes", "Mistakes are costly and users are wary"),
            Scenario::new("casual", 0.1, 0.1, -0.3, 0.1)
                .described("Casual", "Low-stakes exploration with plenty of slack"),
        ];

        let mut scenarios = BTreeMap::new();
        for scenario in presets {
            scenarios.insert(scenario.id.clone(), scenario);
        }
        Self { scenarios }
    }

    /// Parses a JSON document of the form `{"scenarios": [ ... ]}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: ScenarioFile = serde_json::from_str(json)
            .map_err(|e| ConfigError::Invalid(format!("scenario file: {}", e)))?;
        Self::new(file.scenarios)
    }

    /// Loads a scenario file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Invalid(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Looks up a scenario by id.
    pub fn get(&self, id: &str) -> Result<&Scenario, ConfigError> {
        self.scenarios
            .get(id)
            .ok_or_else(|| ConfigError::UnknownScenario(id.to_string()))
    }

    /// Scenario ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.scenarios.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_presets_are_valid() {
        let table = ScenarioTable::builtin();
        assert!(table.len() >= 5);
        for id in table.ids() {
            assert!(table.get(id).unwrap().validate().is_ok());
        }
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "scenarios": [
                {"id": "rush", "motivation": 0.1, "trust": 0.0, "friction": 0.6, "task_criticality": 0.9}
            ]
        }"#;

        let table = ScenarioTable::from_json(json).unwrap();
        let rush = table.get("rush").unwrap();
        assert_eq!(rush.friction, 0.6);
        assert!(rush.name.is_empty());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let result = ScenarioTable::new(vec![Scenario::new("bad", 0.0, 0.0, 1.5, 0.5)]);
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));

        let result = ScenarioTable::new(vec![Scenario::new("bad", 0.0, 0.0, 0.0, -0.1)]);
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = ScenarioTable::new(vec![
            Scenario::new("a", 0.0, 0.0, 0.0, 0.5),
            Scenario::new("a", 0.1, 0.0, 0.0, 0.5),
        ]);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_scenario() {
        let table = ScenarioTable::builtin();
        assert_eq!(
            table.get("nope"),
            Err(ConfigError::UnknownScenario("nope".to_string()))
        );
    }
}
