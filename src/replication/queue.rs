//! Pending-apply queue
//!
//! Min-ordered buffer of elements waiting to be applied by the slave
//! worker. Duplicates and out-of-order arrivals are expected; an element
//! that failed to apply is simply pushed back.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::log::{DataElement, SeqNum};

struct Queued {
    sequence_number: SeqNum,
    arrival: u64,
    element: DataElement,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Equal sequence numbers keep arrival order
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sequence_number, self.arrival).cmp(&(other.sequence_number, other.arrival))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<Queued>>,
    arrivals: u64,
}

/// Multi-producer, single-consumer ordered queue
pub struct ApplyQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl ApplyQueue {
    /// Create a queue with room for `capacity` elements before reallocating.
    /// The queue is unbounded; capacity is only a sizing hint.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::with_capacity(capacity),
                arrivals: 0,
            }),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an element and wake the consumer
    pub fn push(&self, element: DataElement) {
        {
            let mut state = self.lock();
            state.arrivals += 1;
            let arrival = state.arrivals;
            state.heap.push(Reverse(Queued {
                sequence_number: element.sequence_number,
                arrival,
                element,
            }));
        }
        self.available.notify_one();
    }

    /// Remove the element with the lowest sequence number, if any
    pub fn pop(&self) -> Option<DataElement> {
        self.lock().heap.pop().map(|Reverse(queued)| queued.element)
    }

    /// Remove the lowest element, waiting up to `wait` for one to arrive.
    ///
    /// Returns `None` on an empty poll or as soon as `cancel` fires.
    pub async fn pop_wait(&self, wait: Duration, cancel: &CancellationToken) -> Option<DataElement> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(element) = self.pop() {
                return Some(element);
            }
            tokio::select! {
                _ = self.available.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return None,
                _ = cancel.cancelled() => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
