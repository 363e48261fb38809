//! Log Module
//!
//! Append-only, sequence-numbered storage shared by both roles. The
//! master's log is the source of truth; each slave rebuilds a copy of
//! it in its own store.

pub mod entry;
mod file;
mod memory;

pub use entry::{DataElement, SeqNum};
pub use file::FileLog;
pub use memory::MemoryLog;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

/// Append-only log storage.
///
/// Sequence numbers are assigned by the store itself, starting at 1 and
/// increasing by one on every successful append. Callers never supply them.
#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
    /// Append a payload, returning the sequence number it was stored under
    async fn append(&self, payload: &str) -> Result<SeqNum>;

    /// All entries with `sequence_number >= from`, ascending
    async fn entries_from(&self, from: SeqNum) -> Vec<DataElement>;

    /// Highest sequence number stored (0 when empty)
    async fn last_sequence(&self) -> SeqNum;
}

/// Open the log backend selected in the configuration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn LogStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory log storage");
            Ok(Arc::new(MemoryLog::new()))
        }
        StorageBackend::File => {
            tracing::info!("Using file log storage at {:?}", config.path);
            Ok(Arc::new(FileLog::open(&config.path, config.fsync)?))
        }
    }
}
