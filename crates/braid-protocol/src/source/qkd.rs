//! QKD key source
//!
//! Speaks the upstream ETSI-004 JSON vocabulary to the key-management service.
//! The KMS closes its end after every command, so each operation opens a fresh
//! TCP connection. A mock stack stands in when the node is configured without
//! a reachable KMS.

use crate::error::{ProtocolError, QkdError, Result};
use crate::format::key_to_bytes;
use crate::model::{KeyType, OpenConnectQos, OpenConnectUriParameters};
use crate::source::KeySource;
use async_trait::async_trait;
use braid_net::NetworkAddress;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

/// Upper bound on one KMS response
const KMS_RESPONSE_MAX_BYTES: usize = 65_057;

/// In-process stand-in for the QKD stack: random keys, synthetic stream ids
#[derive(Debug, Default)]
pub struct MockQkdStack {
    streams: HashMap<String, usize>,
}

impl MockQkdStack {
    /// Fresh mock stack with no open streams
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock OPEN_CONNECT: mint a synthetic stream id for `chunk_size` keys
    pub fn open_connect(&mut self, chunk_size: usize) -> String {
        let key_stream_id = format!("{}-mock", rand::thread_rng().gen_range(1000..10000));
        self.streams.insert(key_stream_id.clone(), chunk_size);
        tracing::info!(key_stream_id = %key_stream_id, "open connect mocked");
        key_stream_id
    }

    /// Mock GET_KEY: random bytes of the stream's chunk size
    pub fn get_key(&self, key_stream_id: &str) -> Result<Vec<u8>> {
        let chunk_size = self
            .streams
            .get(key_stream_id)
            .copied()
            .ok_or_else(|| QkdError::Protocol(format!("invalid key_stream_id {}", key_stream_id)))?;
        let mut key = vec![0u8; chunk_size];
        rand::thread_rng().fill(key.as_mut_slice());
        Ok(key)
    }

    /// Mock CLOSE: forget the stream
    pub fn close_connection(&mut self, key_stream_id: &str) -> Result<()> {
        self.streams
            .remove(key_stream_id)
            .map(|_| ())
            .ok_or_else(|| {
                QkdError::Protocol(format!("invalid key_stream_id {}", key_stream_id)).into()
            })
    }
}

/// Key source backed by the upstream QKD key-management service
pub struct QkdSource {
    id: String,
    kms_address: NetworkAddress,
    source_uri: String,
    destination_uri: String,
    qkd_ksid: Option<String>,
    mock: Option<MockQkdStack>,
}

impl QkdSource {
    /// Build the source for one session's URIs against the configured KMS
    pub fn new(params: &OpenConnectUriParameters, kms_address: NetworkAddress, mock_qkd: bool) -> Self {
        let id = format!("{}-{}", KeyType::Qkd, Uuid::new_v4());
        tracing::debug!(id = %id, mock_qkd, "initializing QKD source");

        Self {
            id,
            kms_address,
            source_uri: format!("qkd://Application1@{}", params.source_uuid),
            destination_uri: format!("qkd://Application4@{}", params.destination_uuid),
            qkd_ksid: None,
            mock: mock_qkd.then(MockQkdStack::new),
        }
    }

    /// One command/response round against the KMS on a fresh connection
    async fn exchange(&self, request: &Value) -> Result<Value> {
        let mut socket = TcpStream::connect(self.kms_address.to_pair())
            .await
            .map_err(|e| QkdError::Connection(e.to_string()))?;

        let encoded = serde_json::to_vec(request)
            .map_err(|e| QkdError::Protocol(format!("request encoding failed: {}", e)))?;
        socket
            .write_all(&encoded)
            .await
            .map_err(|e| QkdError::Connection(e.to_string()))?;

        let mut buf = vec![0u8; KMS_RESPONSE_MAX_BYTES];
        let n = socket
            .read(&mut buf)
            .await
            .map_err(|e| QkdError::Connection(e.to_string()))?;
        if n == 0 {
            return Err(QkdError::Protocol("empty response from QKD stack".into()).into());
        }

        let response: Value = serde_json::from_slice(&buf[..n])
            .map_err(|e| QkdError::Protocol(format!("response decoding failed: {}", e)))?;
        QkdError::check_status(response["status"].as_i64().unwrap_or(-1))?;
        Ok(response)
    }

    fn stream_id(&self) -> Result<&str> {
        self.qkd_ksid
            .as_deref()
            .ok_or_else(|| QkdError::Protocol("no open key stream".into()).into())
    }
}

#[async_trait]
impl KeySource for QkdSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn key_type(&self) -> KeyType {
        KeyType::Qkd
    }

    async fn open(&mut self, _hybrid_ksid: &str, qos: &OpenConnectQos) -> Result<()> {
        if let Some(mock) = self.mock.as_mut() {
            let chunk_size = qos.chunk_size()?;
            self.qkd_ksid = Some(mock.open_connect(chunk_size));
            return Ok(());
        }

        let request = json!({
            "command": "OPEN_CONNECT",
            "data": {
                "source": self.source_uri,
                "destination": self.destination_uri,
                "qos": qos,
            },
        });
        tracing::debug!(id = %self.id, "sending OPEN_CONNECT to the QKD stack");
        let response = self.exchange(&request).await?;

        let qkd_ksid = response["key_stream_id"].as_str().ok_or_else(|| {
            ProtocolError::from(QkdError::Protocol(
                "OPEN_CONNECT response carries no key_stream_id".into(),
            ))
        })?;
        tracing::debug!(id = %self.id, qkd_ksid = %qkd_ksid, "OPEN_CONNECT completed");
        self.qkd_ksid = Some(qkd_ksid.to_string());
        Ok(())
    }

    async fn get(&mut self) -> Result<Vec<u8>> {
        if let Some(mock) = self.mock.as_ref() {
            return mock.get_key(self.stream_id()?);
        }

        let request = json!({
            "command": "GET_KEY",
            "data": {
                "key_stream_id": self.stream_id()?,
                "index": 0,
                "metadata": {
                    "size": 46,
                    "buffer": "The metadata field is not used for the moment.",
                },
            },
        });
        tracing::debug!(id = %self.id, "sending GET_KEY to the QKD stack");
        let response = self.exchange(&request).await?;

        let key_buffer = response.get("key_buffer").ok_or_else(|| {
            ProtocolError::from(QkdError::Protocol(
                "GET_KEY response carries no key_buffer".into(),
            ))
        })?;
        key_to_bytes(key_buffer)
    }

    async fn close(&mut self) {
        let Some(qkd_ksid) = self.qkd_ksid.take() else {
            return;
        };

        if let Some(mock) = self.mock.as_mut() {
            if let Err(e) = mock.close_connection(&qkd_ksid) {
                tracing::error!(id = %self.id, "failed to close the mock QKD stream: {}", e);
            }
            return;
        }

        let request = json!({
            "command": "CLOSE",
            "data": { "key_stream_id": qkd_ksid },
        });
        match self.exchange(&request).await {
            Ok(_) => tracing::debug!(id = %self.id, qkd_ksid = %qkd_ksid, "CLOSE completed"),
            Err(e) => tracing::error!(id = %self.id, "failed to close the QKD stream: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_streams_hand_out_chunk_sized_keys() {
        let mut mock = MockQkdStack::new();
        let ksid = mock.open_connect(48);
        assert!(ksid.ends_with("-mock"));
        assert_eq!(mock.get_key(&ksid).unwrap().len(), 48);
        // Still open; a second key is fine
        assert_eq!(mock.get_key(&ksid).unwrap().len(), 48);
        mock.close_connection(&ksid).unwrap();
        assert!(mock.get_key(&ksid).is_err());
    }

    #[test]
    fn mock_rejects_unknown_streams() {
        let mut mock = MockQkdStack::new();
        assert!(mock.get_key("missing").is_err());
        assert!(mock.close_connection("missing").is_err());
    }

    #[tokio::test]
    async fn mock_source_serves_the_full_cycle() {
        let params = OpenConnectUriParameters {
            source_uuid: "aaaa".into(),
            destination_uuid: "bbbb".into(),
            hybrid_method: crate::model::HybridizationMethod::Xor,
            key_sources: vec![crate::model::KeyExtractionAlgorithm::Qkd],
        };
        let qos = OpenConnectQos {
            key_chunk_size: 32,
            max_bps: 32000,
            min_bps: 32000,
            jitter: 10,
            priority: 0,
            timeout: 0,
            ttl: 3600,
            metadata_mimetype: "application/json".into(),
        };

        let mut source = QkdSource::new(&params, NetworkAddress::new("127.0.0.1", 1), true);
        assert_eq!(source.key_type(), KeyType::Qkd);
        assert!(source.id().starts_with("QKD-"));

        source.open("unused-hybrid-ksid", &qos).await.unwrap();
        assert_eq!(source.get().await.unwrap().len(), 32);
        source.close().await;
        // Idempotent
        source.close().await;
        assert!(source.get().await.is_err());
    }
}
