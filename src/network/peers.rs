//! Slave Fan-out
//!
//! Pushes each new element to every configured slave. One task per
//! slave, nobody waits for the replies.

use std::time::Duration;

use super::base_url;
use crate::error::{Error, Result};
use crate::replication::{DataElement, PeerBroadcaster};

const APPEND_PATH: &str = "/slave/replication/append_data";

/// HTTP push to a fixed set of slaves
pub struct HttpBroadcaster {
    client: reqwest::Client,
    /// Full append URL of every slave
    targets: Vec<String>,
}

impl HttpBroadcaster {
    /// Create a broadcaster for `peers` (`host:port` each)
    pub fn new(peers: &[String], request_timeout: Duration) -> Result<Self> {
        if peers.is_empty() {
            return Err(Error::InvalidArgument("at least one slave address is required".into()));
        }

        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        let targets = peers
            .iter()
            .map(|peer| format!("{}{}", base_url(peer), APPEND_PATH))
            .collect();

        Ok(Self { client, targets })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

#[async_trait::async_trait]
impl PeerBroadcaster for HttpBroadcaster {
    async fn broadcast(&self, element: &DataElement) -> Result<()> {
        for target in &self.targets {
            let client = self.client.clone();
            let target = target.clone();
            let element = element.clone();

            tokio::spawn(async move {
                let result = client
                    .post(&target)
                    .json(&element)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());

                match result {
                    Ok(_) => tracing::trace!("Pushed sequence {} to {}", element.sequence_number, target),
                    Err(e) => tracing::warn!(
                        "Failed to push sequence {} to {}: {}",
                        element.sequence_number,
                        target,
                        e
                    ),
                }
            });
        }
        Ok(())
    }
}
