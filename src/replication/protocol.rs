//! Replication Protocol
//!
//! Message shapes exchanged between master, slaves and writers. All of
//! them travel as JSON over HTTP.

use serde::{Deserialize, Serialize};

use crate::log::SeqNum;

pub use crate::log::DataElement;

/// Receipt of a replicated element, sent by a slave to the master
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(rename = "replicaId")]
    pub replica_id: String,
    #[serde(rename = "sequenceNum")]
    pub sequence_number: SeqNum,
}

impl Acknowledgement {
    pub fn new(replica_id: impl Into<String>, sequence_number: SeqNum) -> Self {
        Self {
            replica_id: replica_id.into(),
            sequence_number,
        }
    }
}

/// Write request accepted by the master
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendDataRequest {
    /// Number of distinct slaves that must acknowledge before the write returns.
    /// Signed so that malformed negative input reaches validation.
    #[serde(rename = "minAcknowledgments", default)]
    pub min_acknowledgments: i64,
    pub data: String,
}

/// Result of an accepted write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendDataResponse {
    #[serde(rename = "sequenceNum")]
    pub sequence_number: SeqNum,
}
