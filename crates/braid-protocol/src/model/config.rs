//! Parsed configuration value objects the session engine consumes

use braid_net::NetworkAddress;
use serde::{Deserialize, Serialize};

/// The slice of the node configuration the session engine needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's unique identifier
    pub uuid: String,
    /// Upstream QKD key-management service address
    pub qkd_address: NetworkAddress,
    /// Use the in-process mock QKD stack instead of the network KMS
    #[serde(default)]
    pub mock_qkd: bool,
}

/// One known remote peer, keyed by its uuid in the trusted-peers registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Where the partner daemon listens for peer sessions
    pub address: NetworkAddress,
    /// Agreed non-secret salt for deterministic auxiliary keys
    pub shared_seed: String,
}
