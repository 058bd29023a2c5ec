//! Data model shared by the dispatcher, the session engine, and the sources

pub mod config;
pub mod enums;
pub mod requests;

pub use config::{NodeConfig, PeerInfo};
pub use enums::{HybridizationMethod, KeyExtractionAlgorithm, KeyType};
pub use requests::{
    CloseRequest, GetKeyMetadata, GetKeyRequest, OpenConnectQos, OpenConnectRequest,
    OpenConnectUriParameters,
};
