//! Network Module
//!
//! HTTP clients used between nodes: the master's push fan-out to slaves
//! and the slave's backlog and acknowledgement calls to its master.

mod master_client;
mod peers;

pub use master_client::HttpMasterClient;
pub use peers::HttpBroadcaster;

/// Turn a configured `host:port` into a base URL. Addresses that already
/// carry a scheme are used as given.
pub(crate) fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
