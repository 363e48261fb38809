//! Master Node Implementation
//!
//! Accepts writes, appends them to the local log, fans them out to the
//! slaves and optionally blocks the writer until a quorum of distinct
//! slaves acknowledged the write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use super::quorum::QuorumTracker;
use super::{Acknowledgement, DataElement, MasterSettings, PeerBroadcaster};
use crate::error::{Error, Result};
use crate::log::{LogStore, SeqNum};

/// Type alias for the pending writes map
type PendingWritesMap = HashMap<SeqNum, Arc<QuorumTracker>>;

/// Master node state
pub struct Master {
    /// Local log, the source of truth
    repository: Arc<dyn LogStore>,
    /// Slave fan-out
    broadcaster: Arc<dyn PeerBroadcaster>,
    /// Replication settings
    settings: MasterSettings,
    /// Writes awaiting acknowledgement, one tracker per sequence number
    pending_writes: Mutex<PendingWritesMap>,
    /// Fires when the master shuts down
    shutdown: CancellationToken,
}

/// Removes a write's tracker from the pending map when dropped, so every
/// exit path (success, timeout, error, or the caller dropping the future)
/// cleans up.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingWritesMap>,
    sequence_number: SeqNum,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.sequence_number);
    }
}

fn lock_pending(pending: &Mutex<PendingWritesMap>) -> MutexGuard<'_, PendingWritesMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Master {
    /// Create a new master node
    pub fn new(
        repository: Arc<dyn LogStore>,
        settings: MasterSettings,
        broadcaster: Arc<dyn PeerBroadcaster>,
    ) -> Result<Self> {
        if settings.min_ack_wait.is_zero() {
            return Err(Error::InvalidArgument(
                "acknowledgement wait time must be positive".into(),
            ));
        }

        Ok(Self {
            repository,
            broadcaster,
            settings,
            pending_writes: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Accept a write.
    ///
    /// Returns the assigned sequence number once `min_acknowledgments`
    /// distinct slaves have acknowledged it, or immediately after fan-out
    /// when `min_acknowledgments == 0`. A `Timeout` does not roll anything
    /// back: the entry stays in the log and may still reach the slaves.
    pub async fn append_data(&self, min_acknowledgments: i64, payload: &str) -> Result<SeqNum> {
        let required = usize::try_from(min_acknowledgments).map_err(|_| {
            Error::InvalidArgument(format!(
                "min acknowledgments must not be negative, got {}",
                min_acknowledgments
            ))
        })?;

        let sequence_number = self.repository.append(payload).await?;
        tracing::debug!(
            "Appended sequence {}, waiting for {} acknowledgements",
            sequence_number,
            required
        );

        let tracker = Arc::new(QuorumTracker::new(sequence_number, required));
        let _guard = self.register(Arc::clone(&tracker));

        let element = DataElement::new(payload, sequence_number);
        if let Err(e) = self.broadcaster.broadcast(&element).await {
            tracing::warn!("Broadcast of sequence {} failed: {}", sequence_number, e);
        }

        if required > 0 {
            if let Err(e) = tracker.wait(self.settings.min_ack_wait, &self.shutdown).await {
                tracing::warn!("Write {} not confirmed: {}", sequence_number, e);
                return Err(e);
            }
            tracing::debug!("Write {} reached quorum of {}", sequence_number, required);
        }

        Ok(sequence_number)
    }

    fn register(&self, tracker: Arc<QuorumTracker>) -> PendingGuard<'_> {
        let sequence_number = tracker.sequence_number();
        lock_pending(&self.pending_writes).insert(sequence_number, tracker);
        PendingGuard {
            pending: &self.pending_writes,
            sequence_number,
        }
    }

    /// Route a slave's acknowledgement to its pending write.
    ///
    /// Acknowledgements for writes that are unknown or already resolved are
    /// expected under at-least-once delivery and silently dropped.
    pub fn acknowledge_reception(&self, acknowledgement: &Acknowledgement) {
        let tracker = lock_pending(&self.pending_writes)
            .get(&acknowledgement.sequence_number)
            .cloned();

        match tracker {
            Some(tracker) => {
                if tracker.mark_acknowledged(&acknowledgement.replica_id) {
                    tracing::debug!(
                        "Replica {} acknowledged sequence {} ({}/{})",
                        acknowledgement.replica_id,
                        acknowledgement.sequence_number,
                        tracker.acknowledged_count(),
                        tracker.required()
                    );
                }
            }
            None => {
                tracing::trace!(
                    "Ignoring acknowledgement for sequence {} from {}",
                    acknowledgement.sequence_number,
                    acknowledgement.replica_id
                );
            }
        }
    }

    /// Read entries with `sequence_number >= from`
    pub async fn get_data(&self, from: SeqNum) -> Vec<DataElement> {
        self.repository.entries_from(from).await
    }

    /// Highest sequence number in the master's log
    pub async fn last_sequence(&self) -> SeqNum {
        self.repository.last_sequence().await
    }

    /// Number of writes currently waiting for acknowledgements
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending_writes).len()
    }

    /// Fail every in-flight quorum wait with `Cancelled`
    pub fn shutdown(&self) {
        tracing::info!("Master shutting down, cancelling {} pending writes", self.pending_count());
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use crate::replication::testing::RecordingBroadcaster;
    use std::time::{Duration, Instant};

    fn settings(wait_ms: u64) -> MasterSettings {
        MasterSettings {
            min_ack_wait: Duration::from_millis(wait_ms),
        }
    }

    fn master_with(wait_ms: u64, broadcaster: Arc<RecordingBroadcaster>) -> Arc<Master> {
        Arc::new(Master::new(Arc::new(MemoryLog::new()), settings(wait_ms), broadcaster).unwrap())
    }

    fn acknowledge_later(master: &Arc<Master>, delay_ms: u64, replica_id: &str, seq: SeqNum) {
        let master = Arc::clone(master);
        let replica_id = replica_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            master.acknowledge_reception(&Acknowledgement::new(replica_id, seq));
        });
    }

    #[test]
    fn test_zero_wait_time_is_rejected() {
        let result = Master::new(
            Arc::new(MemoryLog::new()),
            settings(0),
            Arc::new(RecordingBroadcaster::new()),
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_negative_min_acknowledgements_is_rejected() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(1000, Arc::clone(&broadcaster));

        let result = master.append_data(-1, "data").await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(master.get_data(0).await.is_empty());
        assert!(broadcaster.sent().is_empty());
    }

    #[tokio::test]
    async fn test_zero_acknowledgements_returns_without_waiting() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(3000, Arc::clone(&broadcaster));

        let start = Instant::now();
        let seq = master.append_data(0, "data").await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(seq, 1);
        assert_eq!(broadcaster.sent(), vec![DataElement::new("data", 1)]);
        assert_eq!(master.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_acknowledgements_are_ignored() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(1000, Arc::clone(&broadcaster));
        master.append_data(0, "data").await.unwrap();

        master.acknowledge_reception(&Acknowledgement::new("r1", 1));
        master.acknowledge_reception(&Acknowledgement::new("r1", 42));

        assert_eq!(master.pending_count(), 0);
        assert_eq!(master.get_data(1).await, vec![DataElement::new("data", 1)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplicate_acknowledgements_count_once() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(3000, Arc::clone(&broadcaster));

        acknowledge_later(&master, 100, "r1", 1);
        acknowledge_later(&master, 150, "r1", 1);
        acknowledge_later(&master, 300, "r2", 1);

        let start = Instant::now();
        let seq = master.append_data(2, "data").await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(seq, 1);
        assert!(elapsed >= Duration::from_millis(300), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3));
        assert_eq!(master.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_quorum_times_out_but_keeps_entry() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(400, Arc::clone(&broadcaster));

        acknowledge_later(&master, 50, "r1", 1);
        acknowledge_later(&master, 80, "r1", 1);

        let start = Instant::now();
        let result = master.append_data(2, "data").await;
        let elapsed = start.elapsed();

        match result {
            Err(Error::Timeout {
                sequence_number,
                acknowledged,
                required,
            }) => {
                assert_eq!(sequence_number, 1);
                assert_eq!(acknowledged, 1);
                assert_eq!(required, 2);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(elapsed >= Duration::from_millis(400));
        assert_eq!(master.pending_count(), 0);
        assert_eq!(master.get_data(0).await, vec![DataElement::new("data", 1)]);
        assert_eq!(broadcaster.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_does_not_abort_write() {
        let broadcaster = Arc::new(RecordingBroadcaster::failing());
        let master = master_with(200, Arc::clone(&broadcaster));

        assert_eq!(master.append_data(0, "a").await.unwrap(), 1);

        let result = master.append_data(1, "b").await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(master.pending_count(), 0);
        assert_eq!(master.last_sequence().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_cancels_waiting_writes() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(5000, broadcaster);

        let writer = Arc::clone(&master);
        let handle = tokio::spawn(async move { writer.append_data(1, "data").await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(master.pending_count(), 1);
        master.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(master.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_writer_removes_tracker() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(5000, broadcaster);

        let writer = Arc::clone(&master);
        let handle = tokio::spawn(async move { writer.append_data(1, "data").await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(master.pending_count(), 1);
        handle.abort();
        let _ = handle.await;

        assert_eq!(master.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_are_tracked_independently() {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let master = master_with(400, broadcaster);

        let first = {
            let master = Arc::clone(&master);
            tokio::spawn(async move { master.append_data(1, "first").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = {
            let master = Arc::clone(&master);
            tokio::spawn(async move { master.append_data(1, "second").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        master.acknowledge_reception(&Acknowledgement::new("r1", 2));

        assert_eq!(second.await.unwrap().unwrap(), 2);
        assert!(matches!(
            first.await.unwrap(),
            Err(Error::Timeout { sequence_number: 1, .. })
        ));
        assert_eq!(master.pending_count(), 0);
    }
}
