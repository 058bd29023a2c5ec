//! Configuration documents
//!
//! Two JSON files configure a node: the general configuration (addresses,
//! certificate material, logging) and the trusted-peers registry keyed by
//! remote uuid. Paths come from the CLI or the `CFGFILE` /
//! `TRUSTED_PEERS_INFO` environment variables.

use anyhow::Context;
use braid_net::{CertificateConfig, NetworkAddress};
use braid_protocol::model::{NodeConfig, PeerInfo};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Verbosity of one log sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogType {
    /// Sink disabled
    None,
    /// Everything
    Debug,
    /// Informational and up
    Info,
    /// Warnings and up
    Warning,
    /// Errors only
    Error,
}

impl TryFrom<String> for LogType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        match value.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown log type {:?}", other)),
        }
    }
}

/// Log sink configuration for one node
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfiguration {
    /// Console sink verbosity
    pub console_log_type: LogType,
    /// Disable ANSI colors on the console sink
    pub colorless_console_log: bool,
    /// File sink verbosity
    pub file_log_type: LogType,
    /// File sink path
    pub filename: String,
}

/// Per-node configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfiguration {
    /// This node's unique identifier
    pub uuid: String,
    /// Log sink configuration
    pub logging_config: LoggingConfiguration,
    /// Certificate material for the peer channel
    pub certificate_config: CertificateConfig,
    /// Agent-facing listen address
    pub hybridization_server_address: NetworkAddress,
    /// Peer-facing listen address
    pub peer_local_address: NetworkAddress,
    /// Upstream QKD key-management service address
    pub qkd_address: NetworkAddress,
    /// Use the in-process mock QKD stack instead of the network KMS
    #[serde(default)]
    pub mock_qkd: bool,
}

impl GeneralConfiguration {
    /// The slice of this configuration the session engine consumes
    pub fn node(&self) -> NodeConfig {
        NodeConfig {
            uuid: self.uuid.clone(),
            qkd_address: self.qkd_address.clone(),
            mock_qkd: self.mock_qkd,
        }
    }
}

/// Load the per-node configuration document
pub fn load_general_config(path: &Path) -> anyhow::Result<GeneralConfiguration> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read configuration file {}", path.display()))?;
    let config: GeneralConfiguration = serde_json::from_str(&raw)
        .with_context(|| format!("cannot parse configuration file {}", path.display()))?;
    println!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load the trusted-peers registry, keyed by remote uuid
pub fn load_trusted_peers(path: &Path) -> anyhow::Result<HashMap<String, PeerInfo>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read trusted-peers file {}", path.display()))?;
    let peers: HashMap<String, PeerInfo> = serde_json::from_str(&raw)
        .with_context(|| format!("cannot parse trusted-peers file {}", path.display()))?;
    println!("Loaded configuration from {}", path.display());
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "uuid": "1984afe6-533b-4a1f-9e45-bd1f15cd4409",
        "logging_config": {
            "console_log_type": "info",
            "colorless_console_log": false,
            "file_log_type": "NONE",
            "filename": "braidd.log"
        },
        "certificate_config": {
            "certificate_ip": "10.0.0.7",
            "cert_authority_path": "/certs/ca.pem",
            "cert_path": "/certs/node.pem",
            "key_path": "/certs/node.key"
        },
        "hybridization_server_address": {"host": "0.0.0.0", "port": 25575},
        "peer_local_address": {"host": "0.0.0.0", "port": 65432},
        "qkd_address": {"host": "10.0.0.8", "port": 25576}
    }"#;

    #[test]
    fn general_configuration_parses() {
        let config: GeneralConfiguration = serde_json::from_str(CONFIG).unwrap();
        assert_eq!(config.uuid, "1984afe6-533b-4a1f-9e45-bd1f15cd4409");
        assert_eq!(config.logging_config.console_log_type, LogType::Info);
        assert_eq!(config.logging_config.file_log_type, LogType::None);
        assert_eq!(config.hybridization_server_address.port, 25575);
        assert!(!config.mock_qkd);

        let node = config.node();
        assert_eq!(node.uuid, config.uuid);
        assert_eq!(node.qkd_address, config.qkd_address);
    }

    #[test]
    fn log_types_parse_case_insensitively() {
        for (raw, expected) in [
            ("\"debug\"", LogType::Debug),
            ("\"Info\"", LogType::Info),
            ("\"WARNING\"", LogType::Warning),
            ("\"error\"", LogType::Error),
            ("\"none\"", LogType::None),
        ] {
            let parsed: LogType = serde_json::from_str(raw).unwrap();
            assert_eq!(parsed, expected);
        }
        assert!(serde_json::from_str::<LogType>("\"verbose\"").is_err());
    }

    #[test]
    fn trusted_peers_parse_as_a_uuid_map() {
        let raw = r#"{
            "20837bb6-aac1-4eb2-be87-ab5bb0f124b5": {
                "address": {"host": "10.0.0.9", "port": 65432},
                "shared_seed": "a-non-secret-salt"
            }
        }"#;
        let peers: HashMap<String, PeerInfo> = serde_json::from_str(raw).unwrap();
        let peer = &peers["20837bb6-aac1-4eb2-be87-ab5bb0f124b5"];
        assert_eq!(peer.address.port, 65432);
        assert_eq!(peer.shared_seed, "a-non-secret-salt");
    }
}
