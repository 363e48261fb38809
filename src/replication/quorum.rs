//! Quorum Tracker
//!
//! Counts distinct acknowledging replicas for one in-flight write and lets
//! the writer wait until enough of them have answered.

use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::log::SeqNum;

/// Acknowledgement tracker for a single sequence number.
///
/// The set of replica ids lives inside a watch channel so that marking and
/// waiting never need a separate lock: a mark that adds a new id wakes the
/// waiter, a repeated mark changes nothing and wakes nobody.
pub struct QuorumTracker {
    sequence_number: SeqNum,
    required: usize,
    acknowledged: watch::Sender<HashSet<String>>,
}

impl QuorumTracker {
    /// Create a tracker needing `required` distinct acknowledgements
    pub fn new(sequence_number: SeqNum, required: usize) -> Self {
        let (acknowledged, _) = watch::channel(HashSet::new());
        Self {
            sequence_number,
            required,
            acknowledged,
        }
    }

    pub fn sequence_number(&self) -> SeqNum {
        self.sequence_number
    }

    pub fn required(&self) -> usize {
        self.required
    }

    /// Record an acknowledgement from `replica_id`.
    ///
    /// Returns `true` if this replica had not acknowledged before.
    pub fn mark_acknowledged(&self, replica_id: &str) -> bool {
        self.acknowledged.send_if_modified(|ids| {
            if ids.contains(replica_id) {
                false
            } else {
                ids.insert(replica_id.to_string())
            }
        })
    }

    /// Number of distinct replicas that have acknowledged so far
    pub fn acknowledged_count(&self) -> usize {
        self.acknowledged.borrow().len()
    }

    pub fn is_satisfied(&self) -> bool {
        self.acknowledged_count() >= self.required
    }

    /// Wait until the required number of replicas acknowledged, the
    /// deadline elapses, or `cancel` fires.
    ///
    /// A tracker with `required == 0` returns immediately.
    pub async fn wait(&self, deadline: Duration, cancel: &CancellationToken) -> Result<()> {
        if self.required == 0 {
            return Ok(());
        }

        let required = self.required;
        let mut rx = self.acknowledged.subscribe();
        let satisfied = async move {
            rx.wait_for(|ids| ids.len() >= required)
                .await
                .map(|_| ())
        };

        tokio::select! {
            result = tokio::time::timeout(deadline, satisfied) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(Error::Cancelled),
                Err(_) => Err(Error::Timeout {
                    sequence_number: self.sequence_number,
                    acknowledged: self.acknowledged_count(),
                    required,
                }),
            },
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}
