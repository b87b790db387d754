pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod sqlite;

pub use checkpoint::CheckpointStore;
pub use error::StoreError;
pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
