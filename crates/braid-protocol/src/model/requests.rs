//! Agent request payloads and URI parameter extraction

use crate::error::{ProtocolError, Result};
use crate::model::enums::{HybridizationMethod, KeyExtractionAlgorithm};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Quality-of-service block of an OPEN_CONNECT request.
///
/// Only `key_chunk_size` steers the hybridization flow; the remaining fields
/// are advisory and passed through to the QKD source verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenConnectQos {
    /// Requested hybrid key length in bytes
    pub key_chunk_size: i64,
    /// Maximum key delivery rate
    pub max_bps: i64,
    /// Minimum key delivery rate
    pub min_bps: i64,
    /// Tolerated delivery jitter
    pub jitter: i64,
    /// Stream priority
    pub priority: i64,
    /// Operation timeout hint
    pub timeout: i64,
    /// Key time-to-live hint
    pub ttl: i64,
    /// Mimetype of the metadata blocks
    pub metadata_mimetype: String,
}

impl OpenConnectQos {
    /// The chunk size as a usable length; positive or nothing
    pub fn chunk_size(&self) -> Result<usize> {
        usize::try_from(self.key_chunk_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or(ProtocolError::InvalidChunkSize(self.key_chunk_size))
    }
}

/// Parameters extracted from the OPEN_CONNECT URIs
#[derive(Debug, Clone)]
pub struct OpenConnectUriParameters {
    /// Uuid from the source URI authority
    pub source_uuid: String,
    /// Uuid from the destination URI authority
    pub destination_uuid: String,
    /// Requested combiner
    pub hybrid_method: HybridizationMethod,
    /// Requested key sources, in request order
    pub key_sources: Vec<KeyExtractionAlgorithm>,
}

/// OPEN_CONNECT request data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenConnectRequest {
    /// Source URI, `qkd://<app>@<uuid>?hybridization=...&key_sources=...`
    pub source: String,
    /// Destination URI, `qkd://<app>@<uuid>`
    pub destination: String,
    /// Quality of service for the stream
    pub qos: OpenConnectQos,
}

/// The authority uuid of `scheme://app@uuid[?query]`
fn authority_uuid(uri: &str) -> Result<&str> {
    let rest = uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| ProtocolError::InvalidRequest(format!("URI {:?} has no scheme", uri)))?;
    let authority = rest
        .split(['?', '/'])
        .next()
        .unwrap_or(rest);
    authority
        .split_once('@')
        .map(|(_, uuid)| uuid)
        .filter(|uuid| !uuid.is_empty())
        .ok_or_else(|| {
            ProtocolError::InvalidRequest(format!("URI {:?} has no authority uuid", uri))
        })
}

/// The value of query parameter `name`, from `scheme://authority?query`
fn query_parameter<'a>(uri: &'a str, name: &str) -> Result<&'a str> {
    let query = uri.split_once('?').map(|(_, q)| q).unwrap_or("");
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .ok_or_else(|| {
            ProtocolError::InvalidRequest(format!("URI is missing query parameter {:?}", name))
        })
}

impl OpenConnectRequest {
    /// Extract uuids, the combiner, and the key-source list from the URIs
    pub fn uri_parameters(&self) -> Result<OpenConnectUriParameters> {
        let source_uuid = authority_uuid(&self.source)?.to_string();
        let destination_uuid = authority_uuid(&self.destination)?.to_string();

        let hybrid_method = query_parameter(&self.source, "hybridization")?.parse()?;
        let key_sources = query_parameter(&self.source, "key_sources")?
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<KeyExtractionAlgorithm>>>()?;
        if key_sources.is_empty() {
            return Err(ProtocolError::InvalidRequest(
                "key_sources names no algorithms".into(),
            ));
        }

        Ok(OpenConnectUriParameters {
            source_uuid,
            destination_uuid,
            hybrid_method,
            key_sources,
        })
    }

    /// Node-local salt naming the KSID-sharing sub-session: SHA-256 hex over
    /// both URIs as received
    pub fn connection_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(self.destination.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Metadata block of a GET_KEY request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetKeyMetadata {
    /// Size of the metadata buffer
    #[serde(default = "GetKeyMetadata::default_size")]
    pub size: i64,
    /// Opaque metadata content
    #[serde(default = "GetKeyMetadata::default_buffer")]
    pub buffer: String,
}

impl GetKeyMetadata {
    fn default_size() -> i64 {
        30
    }

    fn default_buffer() -> String {
        "The metadata field is not used".to_string()
    }
}

impl Default for GetKeyMetadata {
    fn default() -> Self {
        Self {
            size: Self::default_size(),
            buffer: Self::default_buffer(),
        }
    }
}

/// GET_KEY request data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetKeyRequest {
    /// The hybrid key stream this request targets
    pub key_stream_id: String,
    /// Requested key index within the stream
    pub index: i64,
    /// Opaque metadata block
    #[serde(default)]
    pub metadata: GetKeyMetadata,
}

/// CLOSE request data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
    /// The hybrid key stream to close
    pub key_stream_id: String,
}
