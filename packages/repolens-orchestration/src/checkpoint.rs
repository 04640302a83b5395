//! Phase checkpoints for resumable ingestion.

use std::collections::HashSet;

use parking_lot::Mutex;

use repolens_core::error::Result;

use crate::phases::IngestPhase;

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub repository_id: String,
    pub phase: IngestPhase,
    pub cache_key: String,
    /// Serialized phase output (bincode).
    pub data: Vec<u8>,
}

impl Checkpoint {
    pub fn new(
        repository_id: impl Into<String>,
        phase: IngestPhase,
        cache_key: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            repository_id: repository_id.into(),
            phase,
            cache_key: cache_key.into(),
            data,
        }
    }
}

/// In-memory checkpoint store, interface-first so a durable backend can
/// replace it without touching the orchestrator.
pub struct CheckpointManager {
    checkpoints: Mutex<Vec<Checkpoint>>,
}

impl CheckpointManager {
    pub fn new_in_memory() -> Self {
        Self {
            checkpoints: Mutex::new(Vec::new()),
        }
    }

    /// Save, replacing any previous checkpoint of the same phase for the
    /// repository.
    pub async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock();
        checkpoints.retain(|cp| {
            !(cp.repository_id == checkpoint.repository_id && cp.phase == checkpoint.phase)
        });
        checkpoints.push(checkpoint);
        Ok(())
    }

    pub async fn load(&self, cache_key: &str) -> Result<Option<Vec<u8>>> {
        let checkpoints = self.checkpoints.lock();
        Ok(checkpoints
            .iter()
            .find(|cp| cp.cache_key == cache_key)
            .map(|cp| cp.data.clone()))
    }

    /// Phases already completed for this repository snapshot.
    pub async fn completed_phases(
        &self,
        repository_id: &str,
        digest: &str,
    ) -> Result<HashSet<IngestPhase>> {
        let checkpoints = self.checkpoints.lock();
        Ok(checkpoints
            .iter()
            .filter(|cp| {
                cp.repository_id == repository_id
                    && cp.cache_key == cp.phase.cache_key(repository_id, digest)
            })
            .map(|cp| cp.phase)
            .collect())
    }

    /// Cleanup after a successful run.
    pub async fn delete_for_repository(&self, repository_id: &str) -> Result<()> {
        self.checkpoints
            .lock()
            .retain(|cp| cp.repository_id != repository_id);
        Ok(())
    }
}
