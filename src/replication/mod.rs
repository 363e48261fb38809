//! Replication Module
//!
//! The replication state machine shared by both roles: the master's
//! per-write quorum tracking and the slave's ordered apply engine.

pub mod protocol;
mod master;
mod queue;
mod quorum;
mod slave;

#[cfg(test)]
pub(crate) mod testing;

pub use protocol::{Acknowledgement, AppendDataRequest, AppendDataResponse, DataElement};
pub use master::Master;
pub use queue::ApplyQueue;
pub use quorum::QuorumTracker;
pub use slave::Slave;

use std::time::Duration;

use crate::error::Result;
use crate::log::SeqNum;

/// Master-side tuning
#[derive(Debug, Clone)]
pub struct MasterSettings {
    /// How long a write waits for its quorum of acknowledgements
    pub min_ack_wait: Duration,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            min_ack_wait: Duration::from_secs(3),
        }
    }
}

/// Slave-side tuning
#[derive(Debug, Clone)]
pub struct SlaveSettings {
    /// Initial capacity of the pending-apply queue
    pub queue_capacity: usize,
    /// Longest the worker blocks on an empty queue before rechecking state
    pub poll_interval: Duration,
    /// Pause after a failed apply or backlog pull
    pub retry_backoff: Duration,
}

impl Default for SlaveSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            poll_interval: Duration::from_millis(1000),
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

/// Delivers replicated elements from the master to every slave.
///
/// Delivery is best effort and fire-and-forget: implementations dispatch
/// to each target independently and return without waiting for replies.
/// Per-target failures are the implementation's to log and swallow.
#[async_trait::async_trait]
pub trait PeerBroadcaster: Send + Sync {
    async fn broadcast(&self, element: &DataElement) -> Result<()>;
}

/// The slave's view of its master
#[async_trait::async_trait]
pub trait MasterClient: Send + Sync {
    /// Fetch the master's entries with `sequence_number >= from`
    async fn fetch_from(&self, from: SeqNum) -> Result<Vec<DataElement>>;

    /// Report that this replica holds an element
    async fn send_acknowledgement(&self, acknowledgement: &Acknowledgement) -> Result<()>;
}
