//! Replog - Primary-Backup Replication Log
//!
//! A master accepts writes into an append-only, sequence-numbered log and
//! pushes every new entry to a fixed set of slaves. Writers may ask to be
//! held until a minimum number of distinct slaves acknowledged their write.
//!
//! # Architecture
//!
//! Slaves apply entries strictly in sequence order. Pushes that arrive out
//! of order are buffered, and gaps are filled by pulling the backlog from
//! the master. Delivery is at-least-once; duplicate entries are
//! acknowledged again but never applied twice.
//!
//! # Features
//!
//! - In-memory or checksummed file log storage
//! - Per-write quorum waits with timeout and shutdown cancellation
//! - Ordered slave apply with catch-up on start and gap repair
//! - HTTP API for writes, reads, push delivery and acknowledgements

pub mod config;
pub mod error;
pub mod log;
pub mod replication;
pub mod network;
pub mod api;

pub use config::ReplogConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ReplogConfig, Role};
    pub use crate::error::{Error, Result};
    pub use crate::log::{DataElement, LogStore, SeqNum};
    pub use crate::replication::{Acknowledgement, Master, MasterClient, PeerBroadcaster, Slave};
}
