//! In-memory log store

use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::entry::{DataElement, SeqNum};
use super::LogStore;
use crate::error::Result;

#[derive(Default)]
struct MemoryState {
    last: SeqNum,
    entries: BTreeMap<SeqNum, DataElement>,
}

/// Volatile log kept entirely in memory
#[derive(Default)]
pub struct MemoryLog {
    state: RwLock<MemoryState>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl LogStore for MemoryLog {
    async fn append(&self, payload: &str) -> Result<SeqNum> {
        let mut state = self.state.write().await;
        state.last += 1;
        let seq = state.last;
        state.entries.insert(seq, DataElement::new(payload, seq));
        Ok(seq)
    }

    async fn entries_from(&self, from: SeqNum) -> Vec<DataElement> {
        let state = self.state.read().await;
        state.entries.range(from..).map(|(_, e)| e.clone()).collect()
    }

    async fn last_sequence(&self) -> SeqNum {
        self.state.read().await.last
    }
}
