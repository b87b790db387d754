use consilium_models::{AuditEntry, AuditLog};
use uuid::Uuid;

use crate::error::StoreError;

/// Durable sink for audit entries, keyed by run id.
///
/// Append-only: a second append for the same `(run_id, sequence)` fails
/// with [`StoreError::Duplicate`] rather than overwriting.
pub trait CheckpointStore: Send + Sync {
    fn append(&self, run_id: Uuid, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Reconstruct the validated history of one run. Unknown runs load as empty.
    fn load(&self, run_id: Uuid) -> Result<AuditLog, StoreError>;
}
