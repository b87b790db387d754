use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use consilium_models::{AuditEntry, AuditLog};
use rusqlite::Connection;
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::error::StoreError;

pub const AUDIT_TABLE_DDL: &str = "
CREATE TABLE IF NOT EXISTS audit_entries (
    run_id      TEXT    NOT NULL,
    sequence    INTEGER NOT NULL,
    stage       TEXT    NOT NULL,
    success     INTEGER NOT NULL,
    recorded_at TEXT    NOT NULL,
    entry_json  TEXT    NOT NULL,
    PRIMARY KEY (run_id, sequence)
);
CREATE INDEX IF NOT EXISTS idx_audit_entries_recorded_at ON audit_entries(recorded_at);
";

/// SQLite-backed checkpoint store.
///
/// File databases run in WAL mode so a reader (e.g. a replay tool) can
/// follow a run while it is being written. Access is serialized through a
/// `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open (or create) a file database and enable WAL.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(AUDIT_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(AUDIT_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All stored run ids, oldest first.
    pub fn list_runs(&self) -> Result<Vec<Uuid>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT run_id FROM audit_entries GROUP BY run_id ORDER BY MIN(recorded_at), run_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut runs = Vec::with_capacity(ids.len());
        for id in ids {
            match Uuid::parse_str(&id) {
                Ok(uuid) => runs.push(uuid),
                Err(e) => tracing::warn!(run_id = %id, error = %e, "Skipping malformed run id"),
            }
        }
        Ok(runs)
    }

    /// Number of entries stored for a run.
    pub fn count(&self, run_id: Uuid) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: usize = conn.query_row(
            "SELECT COUNT(*) FROM audit_entries WHERE run_id = ?1",
            rusqlite::params![run_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn append(&self, run_id: Uuid, entry: &AuditEntry) -> Result<(), StoreError> {
        let entry_json = serde_json::to_string(entry)?;
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO audit_entries \
             (run_id, sequence, stage, success, recorded_at, entry_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                run_id.to_string(),
                entry.sequence,
                entry.stage.as_str(),
                entry.success,
                Utc::now().to_rfc3339(),
                entry_json,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate {
                    run_id: run_id.to_string(),
                    sequence: entry.sequence,
                })
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    fn load(&self, run_id: Uuid) -> Result<AuditLog, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT entry_json FROM audit_entries WHERE run_id = ?1 ORDER BY sequence",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![run_id.to_string()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let entries = rows
            .iter()
            .map(|json| serde_json::from_str::<AuditEntry>(json))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AuditLog::from_entries(entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consilium_models::Stage;

    fn entry(sequence: u32, stage: Stage, success: bool) -> AuditEntry {
        AuditEntry {
            sequence,
            stage,
            timestamp: Utc::now(),
            duration_ms: 12,
            success,
            payload: serde_json::json!({"attempted": 3, "succeeded": 2}),
            errors: if success {
                vec![]
            } else {
                vec!["insufficient signals".to_string()]
            },
        }
    }

    #[test]
    fn append_and_load_roundtrip() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        let run = Uuid::new_v4();
        let first = entry(0, Stage::MarketIngestion, true);
        let second = entry(1, Stage::AgentSignals, false);
        store.append(run, &first).unwrap();
        store.append(run, &second).unwrap();

        let log = store.load(run).unwrap();
        assert_eq!(log.entries(), &[first, second]);
        assert_eq!(store.count(run).unwrap(), 2);
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        let run = Uuid::new_v4();
        store.append(run, &entry(0, Stage::MarketIngestion, true)).unwrap();
        let err = store
            .append(run, &entry(0, Stage::MarketIngestion, true))
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { sequence: 0, .. }));
        assert_eq!(store.count(run).unwrap(), 1);
    }

    #[test]
    fn unknown_run_loads_empty() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        assert!(store.load(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn list_runs_returns_each_run_once() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(a, &entry(0, Stage::MarketIngestion, true)).unwrap();
        store.append(a, &entry(1, Stage::AgentSignals, true)).unwrap();
        store.append(b, &entry(0, Stage::MarketIngestion, true)).unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.contains(&a));
        assert!(runs.contains(&b));
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let path = path.to_str().unwrap();
        let run = Uuid::new_v4();

        {
            let store = SqliteCheckpointStore::open(path).unwrap();
            store.append(run, &entry(0, Stage::MarketIngestion, true)).unwrap();
        }

        let store = SqliteCheckpointStore::open(path).unwrap();
        let log = store.load(run).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].stage, Stage::MarketIngestion);
    }
}
