/// Save blobs and the blob-store collaborator
///
/// A save is one self-contained blob: metadata plus a deep clone of the
/// authoritative state. Stores are pluggable; the kernel ships blobs to
/// them fire-and-forget and logs the receipts when they come back.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::PersistenceError;
use crate::world::WorldState;

#[derive(Debug, Clone, Serialize)]
pub struct SaveStats {
    pub population: usize,
    pub resource_count: u64,
    pub cycles: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveBlob {
    pub timestamp: DateTime<Utc>,
    pub game_time: f64,
    pub stats: SaveStats,
    pub state: WorldState,
}

impl SaveBlob {
    pub fn capture(state: &WorldState) -> Self {
        Self {
            timestamp: Utc::now(),
            game_time: state.sim_time,
            stats: SaveStats {
                population: state.population(),
                resource_count: state.resource_count(),
                cycles: state.cycles,
            },
            state: state.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveReceipt {
    pub save_id: String,
    pub size_bytes: u64,
}

/// Blob-store collaborator; implementations must tolerate being called from
/// a blocking worker
pub trait SaveStore: Send + Sync {
    fn save(&self, blob: &SaveBlob) -> Result<SaveReceipt, PersistenceError>;
}

/// In-memory store used by tests and the default runner
#[derive(Debug, Default)]
pub struct MemorySaveStore {
    saves: Mutex<Vec<(String, u64, String)>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn last_save(&self) -> Option<(String, u64)> {
        self.saves
            .lock()
            .ok()
            .and_then(|s| s.last().map(|(id, size, _)| (id.clone(), *size)))
    }

    pub fn last_blob_json(&self) -> Option<String> {
        self.saves
            .lock()
            .ok()
            .and_then(|s| s.last().map(|(_, _, json)| json.clone()))
    }
}

impl SaveStore for MemorySaveStore {
    fn save(&self, blob: &SaveBlob) -> Result<SaveReceipt, PersistenceError> {
        let json = serde_json::to_string(blob)?;
        let size_bytes = json.len() as u64;
        let mut saves = self
            .saves
            .lock()
            .map_err(|_| PersistenceError::Store("memory store poisoned".to_string()))?;
        let save_id = format!("save_{:06}", saves.len() + 1);
        saves.push((save_id.clone(), size_bytes, json));
        Ok(SaveReceipt {
            save_id,
            size_bytes,
        })
    }
}

/// Store writing one JSON file per save under a directory
#[derive(Debug)]
pub struct FileSaveStore {
    directory: PathBuf,
    counter: Mutex<u64>,
}

impl FileSaveStore {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            counter: Mutex::new(0),
        })
    }
}

impl SaveStore for FileSaveStore {
    fn save(&self, blob: &SaveBlob) -> Result<SaveReceipt, PersistenceError> {
        let json = serde_json::to_string(blob)?;
        let size_bytes = json.len() as u64;
        let save_id = {
            let mut counter = self
                .counter
                .lock()
                .map_err(|_| PersistenceError::Store("file store poisoned".to_string()))?;
            *counter += 1;
            format!(
                "save_{}_{:06}",
                blob.timestamp.format("%Y%m%d%H%M%S"),
                *counter
            )
        };
        let path = self.directory.join(format!("{}.json", save_id));
        std::fs::write(&path, json)?;
        Ok(SaveReceipt {
            save_id,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::types::AgentProfile;

    #[test]
    fn test_blob_captures_stats() {
        let mut state = WorldState::new(1);
        state.spawn_agent(AgentProfile::default(), 0.0);
        state.spawn_agent(AgentProfile::default(), 0.0);
        state.cycles = 7;

        let blob = SaveBlob::capture(&state);
        assert_eq!(blob.stats.population, 2);
        assert_eq!(blob.stats.cycles, 7);
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemorySaveStore::new();
        let mut state = WorldState::new(1);
        state.spawn_agent(AgentProfile::default(), 0.0);

        let receipt = store.save(&SaveBlob::capture(&state)).unwrap();
        assert_eq!(receipt.save_id, "save_000001");
        assert!(receipt.size_bytes > 0);
        assert_eq!(store.save_count(), 1);

        let json = store.last_blob_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stats"]["population"], 1);
        assert!(value["state"]["agents"].is_object());
    }

    #[test]
    fn test_file_store_writes_blob() {
        let directory = std::env::temp_dir().join(format!(
            "world-simulator-saves-{}",
            std::process::id()
        ));
        let store = FileSaveStore::new(&directory).unwrap();
        let state = WorldState::new(1);

        let receipt = store.save(&SaveBlob::capture(&state)).unwrap();
        let path = directory.join(format!("{}.json", receipt.save_id));
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&directory);
    }
}
