use std::collections::HashMap;
use std::sync::Mutex;

use consilium_models::{AuditEntry, AuditLog};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::error::StoreError;

/// Process-local checkpoint store. Used by tests and by embedders that
/// only need the history for the lifetime of the process.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    runs: Mutex<HashMap<Uuid, Vec<AuditEntry>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let runs = self.lock()?;
        let mut ids: Vec<Uuid> = runs.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Vec<AuditEntry>>>, StoreError> {
        self.runs
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store mutex poisoned: {e}")))
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn append(&self, run_id: Uuid, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut runs = self.lock()?;
        let entries = runs.entry(run_id).or_default();
        if entries.iter().any(|e| e.sequence == entry.sequence) {
            return Err(StoreError::Duplicate {
                run_id: run_id.to_string(),
                sequence: entry.sequence,
            });
        }
        entries.push(entry.clone());
        Ok(())
    }

    fn load(&self, run_id: Uuid) -> Result<AuditLog, StoreError> {
        let entries = self.lock()?.get(&run_id).cloned().unwrap_or_default();
        Ok(AuditLog::from_entries(entries)?)
    }
}
