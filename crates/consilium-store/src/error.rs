use consilium_models::AuditLogError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entry already recorded: run={run_id} sequence={sequence}")]
    Duplicate { run_id: String, sequence: u32 },

    #[error("Stored history is inconsistent: {0}")]
    Corrupt(#[from] AuditLogError),

    #[error("Store not available: {0}")]
    Unavailable(String),
}
