//! Scripted collaborators for replication tests

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use super::{Acknowledgement, DataElement, MasterClient, PeerBroadcaster};
use crate::error::{Error, Result};
use crate::log::{LogStore, MemoryLog, SeqNum};

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Broadcaster that records what it was asked to send
#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<DataElement>>,
    fail: bool,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broadcaster whose every call errors after recording
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<DataElement> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PeerBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, element: &DataElement) -> Result<()> {
        self.sent.lock().unwrap().push(element.clone());
        if self.fail {
            return Err(Error::Network("peer unreachable".into()));
        }
        Ok(())
    }
}

/// Local log that records append attempts and fails scripted payloads
#[derive(Default)]
pub struct FlakyLog {
    inner: MemoryLog,
    attempts: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, usize>>,
}

impl FlakyLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` appends of `payload` fail
    pub fn fail_next(&self, payload: &str, times: usize) {
        self.failures.lock().unwrap().insert(payload.to_string(), times);
    }

    /// Every append attempted, including failed ones
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_of(&self, payload: &str) -> usize {
        self.attempts().iter().filter(|p| *p == payload).count()
    }

    pub async fn payloads(&self) -> Vec<String> {
        self.inner
            .entries_from(0)
            .await
            .into_iter()
            .map(|e| e.payload)
            .collect()
    }
}

#[async_trait::async_trait]
impl LogStore for FlakyLog {
    async fn append(&self, payload: &str) -> Result<SeqNum> {
        self.attempts.lock().unwrap().push(payload.to_string());
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(payload) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Storage(format!("injected failure for {}", payload)));
                }
            }
        }
        self.inner.append(payload).await
    }

    async fn entries_from(&self, from: SeqNum) -> Vec<DataElement> {
        self.inner.entries_from(from).await
    }

    async fn last_sequence(&self) -> SeqNum {
        self.inner.last_sequence().await
    }
}

/// In-process stand-in for the master's backlog and acknowledgement API
#[derive(Default)]
pub struct FakeMaster {
    log: Mutex<Vec<DataElement>>,
    fetches: Mutex<Vec<SeqNum>>,
    fetch_failures: Mutex<usize>,
    acknowledgements: Mutex<Vec<Acknowledgement>>,
    ack_failures: Mutex<usize>,
}

impl FakeMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Master log holding `payloads` at sequence 1..=n
    pub fn with_entries(payloads: &[&str]) -> Self {
        let master = Self::new();
        for payload in payloads {
            master.push(payload);
        }
        master
    }

    /// Append to the master's log, returning the element
    pub fn push(&self, payload: &str) -> DataElement {
        let mut log = self.log.lock().unwrap();
        let element = DataElement::new(payload, log.len() as SeqNum + 1);
        log.push(element.clone());
        element
    }

    pub fn fail_next_fetches(&self, times: usize) {
        *self.fetch_failures.lock().unwrap() = times;
    }

    pub fn fail_next_acknowledgements(&self, times: usize) {
        *self.ack_failures.lock().unwrap() = times;
    }

    /// `from` argument of every fetch attempted
    pub fn fetches(&self) -> Vec<SeqNum> {
        self.fetches.lock().unwrap().clone()
    }

    /// Every acknowledgement attempted, including failed ones
    pub fn acknowledgements(&self) -> Vec<Acknowledgement> {
        self.acknowledgements.lock().unwrap().clone()
    }

    pub fn acknowledged(&self, sequence_number: SeqNum) -> usize {
        self.acknowledgements()
            .iter()
            .filter(|a| a.sequence_number == sequence_number)
            .count()
    }
}

#[async_trait::async_trait]
impl MasterClient for FakeMaster {
    async fn fetch_from(&self, from: SeqNum) -> Result<Vec<DataElement>> {
        self.fetches.lock().unwrap().push(from);
        {
            let mut failures = self.fetch_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Network("master unreachable".into()));
            }
        }
        let log = self.log.lock().unwrap();
        // Hand the backlog out newest first; the slave must sort it
        Ok(log
            .iter()
            .filter(|e| e.sequence_number >= from)
            .rev()
            .cloned()
            .collect())
    }

    async fn send_acknowledgement(&self, acknowledgement: &Acknowledgement) -> Result<()> {
        self.acknowledgements
            .lock()
            .unwrap()
            .push(acknowledgement.clone());
        let mut failures = self.ack_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(Error::Network("master unreachable".into()));
        }
        Ok(())
    }
}
