//! Log Entry Types
//!
//! Defines the sequence-numbered element stored in the log and
//! shipped between master and slaves.

use serde::{Deserialize, Serialize};

/// Sequence number assigned by the log on append. The first entry is 1.
pub type SeqNum = u64;

/// A single replicated log element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataElement {
    /// Opaque payload supplied by the writer
    #[serde(rename = "data")]
    pub payload: String,
    /// Position of the element in the master's log
    #[serde(rename = "sequenceNum")]
    pub sequence_number: SeqNum,
}

impl DataElement {
    pub fn new(payload: impl Into<String>, sequence_number: SeqNum) -> Self {
        Self {
            payload: payload.into(),
            sequence_number,
        }
    }
}
