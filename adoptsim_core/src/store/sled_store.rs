//! Sled-backed persistent store.
//!
//! Layout (values are JSON):
//!
//! | tree          | key                                   | value            |
//! |---------------|---------------------------------------|------------------|
//! | `explorations`| exploration id                        | `Exploration`    |
//! | `exploration_index` | sequence (BE)                   | exploration id   |
//! | `nodes`       | node id                               | `ScenarioNode`   |
//! | `node_index`  | exploration id ++ sequence (BE)       | node id          |
//! | `runs`        | run id                                | `SimulationRun`  |
//! | `outcomes`    | run id ++ index (BE)                  | `PersonaOutcome` |
//!
//! Sequences come from `Db::generate_id`, which is monotonic, so prefix
//! scans over the index trees return creation order.
//!
//! Writes validate against current contents before touching the trees, so
//! every mutating call holds `writes` from its first read to its flush.

use adoptsim_env::{ExplorationId, NodeId, RunId};
use serde::de::DeserializeOwned;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use super::{check_parent, ExplorationStore};
use crate::error::StoreError;
use crate::exploration::{Exploration, NodeStatus, ScenarioNode};
use crate::simulation::{PersonaOutcome, SimulationRun};

pub struct SledExplorationStore {
    db: sled::Db,
    explorations: sled::Tree,
    exploration_index: sled::Tree,
    nodes: sled::Tree,
    node_index: sled::Tree,
    runs: sled::Tree,
    outcomes: sled::Tree,

    /// Serializes check-then-write sequences
    writes: Mutex<()>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn uuid_from(bytes: &[u8]) -> Result<Uuid, StoreError> {
    Uuid::from_slice(bytes).map_err(|e| StoreError::Storage(format!("corrupt index entry: {}", e)))
}

fn indexed_key(prefix: &Uuid, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(prefix.as_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

impl SledExplorationStore {
    /// Open a persistent store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Storage(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db)
    }

    /// Create a temporary store, removed on drop.
    pub fn open_temp() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Storage(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            explorations: db.open_tree("explorations")?,
            exploration_index: db.open_tree("exploration_index")?,
            nodes: db.open_tree("nodes")?,
            node_index: db.open_tree("node_index")?,
            runs: db.open_tree("runs")?,
            outcomes: db.open_tree("outcomes")?,
            writes: Mutex::new(()),
            db,
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(tree: &sled::Tree, key: &Uuid) -> Result<Option<T>, StoreError> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(tree: &sled::Tree, key: &Uuid, value: &T) -> Result<(), StoreError> {
        tree.insert(key.as_bytes(), encode(value)?)?;
        Ok(())
    }
}

impl ExplorationStore for SledExplorationStore {
    fn create_exploration(&self, exploration: &Exploration) -> Result<(), StoreError> {
        let _guard = self.writes.lock();
        let key = exploration.id.as_uuid();
        if self.explorations.contains_key(key.as_bytes())? {
            return Err(StoreError::Integrity(format!(
                "exploration {} already exists",
                exploration.id
            )));
        }
        Self::write(&self.explorations, &key, exploration)?;
        let sequence = self.db.generate_id()?;
        self.exploration_index
            .insert(sequence.to_be_bytes(), key.as_bytes().as_slice())?;
        self.flush()
    }

    fn update_exploration(&self, exploration: &Exploration) -> Result<(), StoreError> {
        let _guard = self.writes.lock();
        let key = exploration.id.as_uuid();
        if !self.explorations.contains_key(key.as_bytes())? {
            return Err(StoreError::ExplorationNotFound(exploration.id));
        }
        Self::write(&self.explorations, &key, exploration)?;
        self.flush()
    }

    fn get_exploration(&self, id: ExplorationId) -> Result<Option<Exploration>, StoreError> {
        Self::read(&self.explorations, &id.as_uuid())
    }

    fn list_explorations(&self) -> Result<Vec<Exploration>, StoreError> {
        let mut explorations = Vec::new();
        for entry in self.exploration_index.iter() {
            let (_, id) = entry?;
            if let Some(exploration) = Self::read(&self.explorations, &uuid_from(&id)?)? {
                explorations.push(exploration);
            }
        }
        Ok(explorations)
    }

    fn insert_node(&self, node: &ScenarioNode) -> Result<(), StoreError> {
        let _guard = self.writes.lock();
        if !self.explorations.contains_key(node.exploration_id.as_uuid().as_bytes())? {
            return Err(StoreError::ExplorationNotFound(node.exploration_id));
        }
        let key = node.id.as_uuid();
        if self.nodes.contains_key(key.as_bytes())? {
            return Err(StoreError::Integrity(format!("node {} already exists", node.id)));
        }

        let parent = match node.parent_id {
            Some(parent_id) => self.get_node(parent_id)?,
            None => None,
        };
        check_parent(node, parent.as_ref())?;

        if node.is_root() || node.node_status == NodeStatus::Winner {
            for existing in self.list_nodes(node.exploration_id)? {
                if node.is_root() && existing.is_root() {
                    return Err(StoreError::Integrity(format!(
                        "exploration {} already has a root",
                        node.exploration_id
                    )));
                }
                if node.node_status == NodeStatus::Winner && existing.node_status == NodeStatus::Winner {
                    return Err(StoreError::Integrity(format!(
                        "exploration {} already has a winner",
                        node.exploration_id
                    )));
                }
            }
        }

        Self::write(&self.nodes, &key, node)?;
        let sequence = self.db.generate_id()?;
        self.node_index.insert(
            indexed_key(&node.exploration_id.as_uuid(), sequence),
            key.as_bytes().as_slice(),
        )?;
        self.flush()
    }

    fn update_node_status(&self, id: NodeId, status: NodeStatus) -> Result<(), StoreError> {
        let _guard = self.writes.lock();
        let mut node = self.get_node(id)?.ok_or(StoreError::NodeNotFound(id))?;

        if status == NodeStatus::Winner {
            if let Some(winner) = self.get_winner(node.exploration_id)? {
                if winner.id != id {
                    return Err(StoreError::Integrity(format!(
                        "exploration {} already has winner {}",
                        node.exploration_id, winner.id
                    )));
                }
            }
        }

        node.node_status = status;
        Self::write(&self.nodes, &id.as_uuid(), &node)?;
        self.flush()
    }

    fn get_node(&self, id: NodeId) -> Result<Option<ScenarioNode>, StoreError> {
        Self::read(&self.nodes, &id.as_uuid())
    }

    fn list_nodes(&self, exploration_id: ExplorationId) -> Result<Vec<ScenarioNode>, StoreError> {
        let mut nodes = Vec::new();
        for entry in self.node_index.scan_prefix(exploration_id.as_uuid().as_bytes()) {
            let (_, id) = entry?;
            let node_id = uuid_from(&id)?;
            let node = Self::read(&self.nodes, &node_id)?.ok_or_else(|| {
                StoreError::Integrity(format!("index points at missing node {}", node_id))
            })?;
            nodes.push(node);
        }
        Ok(nodes)
    }

    fn save_run(&self, run: &SimulationRun) -> Result<(), StoreError> {
        let _guard = self.writes.lock();
        let key = run.id.as_uuid();
        if let Some(existing) = Self::read::<SimulationRun>(&self.runs, &key)? {
            if existing.is_finished() {
                return Err(StoreError::Integrity(format!("run {} is already finished", run.id)));
            }
        }
        Self::write(&self.runs, &key, run)?;
        self.flush()
    }

    fn get_run(&self, id: RunId) -> Result<Option<SimulationRun>, StoreError> {
        Self::read(&self.runs, &id.as_uuid())
    }

    fn save_persona_outcomes(&self, run_id: RunId, outcomes: &[PersonaOutcome]) -> Result<(), StoreError> {
        let _guard = self.writes.lock();
        let prefix = run_id.as_uuid();
        if self.outcomes.scan_prefix(prefix.as_bytes()).next().is_some() {
            return Err(StoreError::Integrity(format!("outcomes for run {} already saved", run_id)));
        }

        let mut batch = sled::Batch::default();
        for (index, outcome) in outcomes.iter().enumerate() {
            batch.insert(indexed_key(&prefix, index as u64), encode(outcome)?);
        }
        self.outcomes.apply_batch(batch)?;
        self.flush()
    }

    fn list_persona_outcomes(&self, run_id: RunId) -> Result<Vec<PersonaOutcome>, StoreError> {
        let mut outcomes = Vec::new();
        for entry in self.outcomes.scan_prefix(run_id.as_uuid().as_bytes()) {
            let (_, bytes) = entry?;
            outcomes.push(decode(&bytes)?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    fn store() -> SledExplorationStore {
        SledExplorationStore::open_temp().unwrap()
    }

    #[test]
    fn test_exploration_roundtrip() {
        contract::exploration_roundtrip(&store());
    }

    #[test]
    fn test_tree_queries() {
        contract::tree_queries(&store());
    }

    #[test]
    fn test_integrity() {
        contract::integrity(&store());
    }

    #[test]
    fn test_runs_and_outcomes() {
        contract::runs_and_outcomes(&store());
    }

    #[test]
    fn test_racing_writers() {
        contract::racing_writers(&store());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = std::env::temp_dir().join(format!("adoptsim-store-{}", Uuid::new_v4()));

        let (exploration, nodes) = {
            let store = SledExplorationStore::open(&dir).unwrap();
            contract::seeded_tree(&store)
        };

        {
            let store = SledExplorationStore::open(&dir).unwrap();
            assert_eq!(store.get_exploration(exploration.id).unwrap(), Some(exploration.clone()));
            let ids: Vec<NodeId> = store.list_nodes(exploration.id).unwrap().iter().map(|n| n.id).collect();
            assert_eq!(ids, nodes.iter().map(|n| n.id).collect::<Vec<_>>());
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_explorations_listed_in_creation_order() {
        let store = store();
        let first = contract::exploration();
        let second = contract::exploration();
        store.create_exploration(&first).unwrap();
        store.create_exploration(&second).unwrap();

        let ids: Vec<ExplorationId> = store.list_explorations().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
