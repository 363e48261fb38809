//! Slave Node Implementation
//!
//! Rebuilds the master's log locally. Pushed elements land in an ordered
//! queue drained by a single worker task, which applies them strictly in
//! sequence order, fills gaps by pulling backlog from the master and
//! acknowledges what it holds.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::queue::ApplyQueue;
use super::{Acknowledgement, DataElement, MasterClient, SlaveSettings};
use crate::error::{Error, Result};
use crate::log::{LogStore, SeqNum};

/// Slave node state
pub struct Slave {
    engine: Arc<ApplyEngine>,
    /// Worker task handle, present while running
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Set once `stop` was requested; a stopped slave cannot restart
    stopped: AtomicBool,
    cancel: CancellationToken,
}

/// State shared between the slave handle and its worker task.
///
/// `applied` is written only by the worker.
struct ApplyEngine {
    replica_id: String,
    repository: Arc<dyn LogStore>,
    master: Arc<dyn MasterClient>,
    settings: SlaveSettings,
    queue: ApplyQueue,
    applied: AtomicU64,
}

impl Slave {
    /// Create a new slave node
    pub fn new(
        repository: Arc<dyn LogStore>,
        master: Arc<dyn MasterClient>,
        settings: SlaveSettings,
        replica_id: impl Into<String>,
    ) -> Result<Self> {
        let replica_id = replica_id.into();
        if replica_id.is_empty() {
            return Err(Error::InvalidArgument("replica id cannot be empty".into()));
        }
        if settings.queue_capacity < 1 {
            return Err(Error::InvalidArgument(
                "replication queue capacity must be positive".into(),
            ));
        }
        if settings.poll_interval.is_zero() || settings.retry_backoff.is_zero() {
            return Err(Error::InvalidArgument(
                "poll interval and retry backoff must be positive".into(),
            ));
        }

        let engine = ApplyEngine {
            replica_id,
            repository,
            master,
            queue: ApplyQueue::with_capacity(settings.queue_capacity),
            settings,
            applied: AtomicU64::new(0),
        };

        Ok(Self {
            engine: Arc::new(engine),
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Queue a pushed element for application. Never blocks on the worker.
    pub fn enqueue(&self, element: DataElement) {
        tracing::debug!("Queued sequence {} for apply", element.sequence_number);
        self.engine.queue.push(element);
    }

    /// Read local entries with `sequence_number >= from`
    pub async fn read_local(&self, from: SeqNum) -> Vec<DataElement> {
        self.engine.repository.entries_from(from).await
    }

    /// Highest sequence number held by the local log
    pub async fn last_sequence(&self) -> SeqNum {
        self.engine.repository.last_sequence().await
    }

    /// Launch the worker.
    ///
    /// The applied position starts at whatever the local log already holds,
    /// so a slave with a durable log only catches up on the missing suffix.
    pub async fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::InvalidState("slave was stopped".into()));
        }
        if worker.is_some() {
            return Err(Error::InvalidState("slave already started".into()));
        }

        let local = self.engine.repository.last_sequence().await;
        self.engine.applied.store(local, Ordering::Release);

        tracing::info!(
            "Starting replica {} at applied sequence {}",
            self.engine.replica_id,
            local
        );

        let engine = Arc::clone(&self.engine);
        let cancel = self.cancel.clone();
        *worker = Some(tokio::spawn(async move { engine.run(cancel).await }));
        Ok(())
    }

    /// Cancel the worker and wait for it to exit.
    ///
    /// Already-applied state is kept; elements still queued are dropped and
    /// will be recovered from the master's backlog on the next start.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.cancel.cancel();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Replication worker ended abnormally: {}", e);
            }
            tracing::info!(
                "Replica {} stopped at applied sequence {}",
                self.engine.replica_id,
                self.applied_sequence()
            );
        }
    }

    /// Highest sequence number applied to the local log
    pub fn applied_sequence(&self) -> SeqNum {
        self.engine.applied()
    }

    pub fn replica_id(&self) -> &str {
        &self.engine.replica_id
    }

    /// Number of elements waiting in the apply queue
    pub fn queued(&self) -> usize {
        self.engine.queue.len()
    }

    pub async fn is_running(&self) -> bool {
        match self.worker.lock().await.as_ref() {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }
}

impl ApplyEngine {
    fn applied(&self) -> SeqNum {
        self.applied.load(Ordering::Acquire)
    }

    async fn run(&self, cancel: CancellationToken) {
        // Initial catch-up, retried until it succeeds once
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.replicate_backlog().await {
                Ok(count) => {
                    tracing::info!(
                        "Initial catch-up applied {} entries, now at sequence {}",
                        count,
                        self.applied()
                    );
                    break;
                }
                Err(e) => {
                    log_failure("Initial catch-up failed", &e);
                    if !self.backoff(&cancel).await {
                        return;
                    }
                }
            }
        }

        while !cancel.is_cancelled() {
            let Some(element) = self
                .queue
                .pop_wait(self.settings.poll_interval, &cancel)
                .await
            else {
                continue;
            };
            self.process(element, &cancel).await;
        }

        tracing::debug!("Replication worker for {} exiting", self.replica_id);
    }

    async fn process(&self, element: DataElement, cancel: &CancellationToken) {
        let seq = element.sequence_number;
        let applied = self.applied();

        if seq <= applied {
            tracing::trace!("Sequence {} already applied", seq);
            self.acknowledge(seq).await;
        } else if seq == applied + 1 {
            match self.repository.append(&element.payload).await {
                Ok(local_seq) => {
                    if local_seq != seq {
                        tracing::warn!(
                            "Local log assigned sequence {} to replicated sequence {}",
                            local_seq,
                            seq
                        );
                    }
                    self.applied.store(seq, Ordering::Release);
                    tracing::debug!("Applied sequence {}", seq);
                    self.acknowledge(seq).await;
                }
                Err(e) => {
                    log_failure(&format!("Failed to apply sequence {}", seq), &e);
                    self.queue.push(element);
                    self.backoff(cancel).await;
                }
            }
        } else {
            tracing::info!("Gap detected: applied {}, received {}", applied, seq);
            match self.replicate_backlog().await {
                Ok(_) if self.applied() + 1 >= seq => {
                    // Re-evaluated on a later iteration, now as applied or next
                    self.queue.push(element);
                }
                Ok(_) => {
                    tracing::warn!(
                        "Backlog from master ended at {} without reaching {}",
                        self.applied(),
                        seq
                    );
                    self.queue.push(element);
                    self.backoff(cancel).await;
                }
                Err(e) => {
                    log_failure(&format!("Backlog pull from {} failed", applied + 1), &e);
                    self.queue.push(element);
                    self.backoff(cancel).await;
                }
            }
        }
    }

    /// Pull and apply everything after the applied position, in order.
    ///
    /// Stops at the first failure; entries applied before it stay applied.
    async fn replicate_backlog(&self) -> Result<usize> {
        let from = self.applied() + 1;
        let mut entries = self.master.fetch_from(from).await?;
        entries.sort_by_key(|e| e.sequence_number);

        let mut count = 0;
        for entry in entries {
            let applied = self.applied();
            if entry.sequence_number <= applied {
                continue;
            }
            if entry.sequence_number != applied + 1 {
                return Err(Error::InvalidState(format!(
                    "backlog skips from sequence {} to {}",
                    applied, entry.sequence_number
                )));
            }
            self.repository.append(&entry.payload).await?;
            self.applied.store(entry.sequence_number, Ordering::Release);
            count += 1;
        }

        if count > 0 {
            tracing::debug!("Backlog applied sequences {} to {}", from, self.applied());
        }
        Ok(count)
    }

    /// Best effort: a lost acknowledgement only delays the master's quorum
    async fn acknowledge(&self, seq: SeqNum) {
        let acknowledgement = Acknowledgement::new(self.replica_id.clone(), seq);
        if let Err(e) = self.master.send_acknowledgement(&acknowledgement).await {
            tracing::warn!("Failed to acknowledge sequence {}: {}", seq, e);
        }
    }

    /// Sleep for the retry backoff. Returns `false` if cancelled meanwhile.
    async fn backoff(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.retry_backoff) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

/// Log a worker failure at warn if it is transient, error otherwise
fn log_failure(context: &str, e: &Error) {
    if e.is_retryable() {
        tracing::warn!("{}: {}", context, e);
    } else {
        tracing::error!("{}: {}", context, e);
    }
}
