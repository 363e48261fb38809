//! Master Client
//!
//! The slave's HTTP view of its master.

use std::time::Duration;

use super::base_url;
use crate::error::Result;
use crate::log::SeqNum;
use crate::replication::{Acknowledgement, DataElement, MasterClient};

/// HTTP client for the master's data and replication endpoints
pub struct HttpMasterClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMasterClient {
    /// Create a client for the master at `address` (`host:port`)
    pub fn new(address: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url(address),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl MasterClient for HttpMasterClient {
    async fn fetch_from(&self, from: SeqNum) -> Result<Vec<DataElement>> {
        let url = format!("{}/master/data/get_data/{}", self.base_url, from);
        let entries = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<DataElement>>()
            .await?;

        tracing::debug!("Fetched {} entries from sequence {}", entries.len(), from);
        Ok(entries)
    }

    async fn send_acknowledgement(&self, acknowledgement: &Acknowledgement) -> Result<()> {
        let url = format!("{}/master/replication/acknowledge_reception", self.base_url);
        self.client
            .post(&url)
            .json(acknowledgement)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
