//! Session engine
//!
//! One `Session` per open ETSI-004 stream. The constructor derives the
//! connection role from the request URIs, resolves the partner daemon, and
//! builds the key sources. Each operation then runs the same shape: fan out
//! over the live sources in parallel, capture per-source failures, and -- for
//! GET_KEY -- hybridize whatever came back. A source that fails `open` is
//! dropped from the session for good; `get` failures only leave it out of
//! that one result set.

use crate::error::{ProtocolError, Result};
use crate::model::{
    CloseRequest, GetKeyRequest, HybridizationMethod, KeyExtractionAlgorithm, NodeConfig,
    OpenConnectQos, OpenConnectRequest, OpenConnectUriParameters, PeerInfo,
};
use crate::source::{KeySource, PqcSource, QkdSource};
use braid_crypto::hybridize::{hmac_keys, xor_hmac_keys, xor_keys};
use braid_crypto::seed::deterministic_aux_key;
use braid_crypto::KemAlgorithm;
use braid_net::{
    ConnectionRole, PeerConnectionManager, PeerSessionReference, PeerSessionType,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Map-key under which the synthetic auxiliary key joins the result set
const AUX_SOURCE_ID: &str = "aux";

type SharedSource = Arc<Mutex<Box<dyn KeySource>>>;

/// Runtime state of one open hybrid key stream
pub struct Session {
    role: ConnectionRole,
    peer: PeerInfo,
    peer_manager: Arc<PeerConnectionManager>,
    qos: Option<OpenConnectQos>,
    hybrid_method: HybridizationMethod,
    sources: HashMap<String, SharedSource>,
    hybrid_ksid: Option<String>,
}

impl Session {
    /// Derive the role, resolve the peer, and build the requested sources
    pub fn new(
        node: &NodeConfig,
        peers_info: &HashMap<String, PeerInfo>,
        peer_manager: Arc<PeerConnectionManager>,
        params: &OpenConnectUriParameters,
    ) -> Result<Self> {
        let role = if node.uuid == params.source_uuid {
            ConnectionRole::Client
        } else if node.uuid == params.destination_uuid {
            ConnectionRole::Server
        } else {
            tracing::error!(
                source = %params.source_uuid,
                destination = %params.destination_uuid,
                local = %node.uuid,
                "the open connect request did not contain the local node uuid"
            );
            return Err(ProtocolError::UuidMismatch {
                source: params.source_uuid.clone(),
                destination: params.destination_uuid.clone(),
                local: node.uuid.clone(),
            });
        };
        tracing::info!(role = %role, "chose the connection role");

        let peer_uuid = match role {
            ConnectionRole::Client => &params.destination_uuid,
            ConnectionRole::Server => &params.source_uuid,
        };
        let peer = peers_info
            .get(peer_uuid)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownPeer(peer_uuid.clone()))?;
        tracing::debug!(peer = %peer.address, "found the peer connection information");

        let mut sources: HashMap<String, SharedSource> = HashMap::new();
        let mut appearance_counts: HashMap<KemAlgorithm, usize> = HashMap::new();
        let mut qkd_built = false;
        for algorithm in &params.key_sources {
            let source: Box<dyn KeySource> = match algorithm {
                // A single QKD stream serves the session no matter how often
                // it is listed
                KeyExtractionAlgorithm::Qkd if qkd_built => continue,
                KeyExtractionAlgorithm::Qkd => {
                    qkd_built = true;
                    Box::new(QkdSource::new(
                        params,
                        node.qkd_address.clone(),
                        node.mock_qkd,
                    ))
                }
                KeyExtractionAlgorithm::Kem(kem_algorithm) => {
                    let count = appearance_counts.entry(*kem_algorithm).or_insert(0);
                    let appearance_index = *count;
                    *count += 1;
                    Box::new(PqcSource::new(
                        Arc::clone(&peer_manager),
                        peer.address.clone(),
                        role,
                        *kem_algorithm,
                        appearance_index,
                    )?)
                }
            };
            sources.insert(source.id().to_string(), Arc::new(Mutex::new(source)));
        }
        tracing::debug!(count = sources.len(), "key sources initialized");

        Ok(Self {
            role,
            peer,
            peer_manager,
            qos: None,
            hybrid_method: params.hybrid_method,
            sources,
            hybrid_ksid: None,
        })
    }

    /// The hybrid KSID, once OPEN_CONNECT has succeeded
    pub fn hybrid_ksid(&self) -> Option<&str> {
        self.hybrid_ksid.as_deref()
    }

    /// Agree on the hybrid KSID with the partner daemon.
    ///
    /// CLIENT generates a v4 uuid and ships its 16 raw bytes; SERVER reads
    /// exactly 16. Both decode to the canonical string form.
    async fn share_ksid(&self, connection_id: &str) -> Result<String> {
        let reference =
            PeerSessionReference::new(PeerSessionType::ShareKsid, connection_id);
        tracing::debug!(peer = %self.peer.address, "connecting peer to agree on the session ksid");

        let mut stream = self
            .peer_manager
            .connect_peer(&reference, self.role, &self.peer.address)
            .await?;

        let ksid = match self.role {
            ConnectionRole::Client => {
                let ksid = Uuid::new_v4();
                tracing::debug!("[CLIENT] hybrid KSID generated, sending it to the server");
                stream.write_all(ksid.as_bytes()).await?;
                ksid
            }
            ConnectionRole::Server => {
                tracing::debug!("[SERVER] waiting for the connection ksid");
                let raw = stream.read_exact(16).await?;
                Uuid::from_slice(&raw)
                    .map_err(|e| ProtocolError::InvalidRequest(format!("bad ksid bytes: {}", e)))?
            }
        };
        stream.shutdown().await;

        Ok(ksid.to_string())
    }

    /// Handle OPEN_CONNECT: share the KSID, then open every source in parallel
    pub async fn open_connect(&mut self, request: &OpenConnectRequest) -> Value {
        self.qos = Some(request.qos.clone());

        let hybrid_ksid = match self.share_ksid(&request.connection_id()).await {
            Ok(ksid) => ksid,
            Err(e) => {
                tracing::error!(peer = %self.peer.address, "failed to share ksid: {}", e);
                return json!({"status": 1, "message": e.to_string()});
            }
        };
        tracing::info!(hybrid_ksid = %hybrid_ksid, peer = %self.peer.address, "hybrid ksid agreed");

        let mut workers = JoinSet::new();
        for (source_id, source) in &self.sources {
            let source_id = source_id.clone();
            let source = Arc::clone(source);
            let hybrid_ksid = hybrid_ksid.clone();
            let qos = request.qos.clone();
            workers.spawn(async move {
                tracing::info!(source = %source_id, "attempting to OPEN CONNECT");
                let mut guard = source.lock().await;
                match guard.open(&hybrid_ksid, &qos).await {
                    Ok(()) => {
                        tracing::info!(source = %source_id, "OPEN CONNECT successful");
                        Some(source_id)
                    }
                    Err(e) => {
                        tracing::error!(source = %source_id, "failed OPEN CONNECT: {}", e);
                        None
                    }
                }
            });
        }

        let mut opened = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Some(source_id)) => opened.push(source_id),
                Ok(None) => {}
                Err(e) => tracing::error!("source worker failed to run: {}", e),
            }
        }

        if opened.is_empty() {
            tracing::error!("none of the sources could open connect");
            return json!({
                "status": 1,
                "message": "None of the key sources could open connect.",
            });
        }

        // Sources missing from the results are out of this session for good
        self.sources.retain(|source_id, _| {
            let keep = opened.contains(source_id);
            if !keep {
                tracing::warn!(
                    source = %source_id,
                    "source failed to open connect, removing it from the session"
                );
            }
            keep
        });

        self.hybrid_ksid = Some(hybrid_ksid.clone());
        json!({"status": 0, "key_stream_id": hybrid_ksid})
    }

    /// Handle GET_KEY: fetch from every live source in parallel and hybridize
    pub async fn get_key(&mut self, _request: &GetKeyRequest) -> Value {
        let Some(qos) = self.qos.clone() else {
            return json!({
                "status": 1,
                "message": "OPEN_CONNECT must succeed before GET_KEY.",
            });
        };

        let mut workers = JoinSet::new();
        for (source_id, source) in &self.sources {
            let source_id = source_id.clone();
            let source = Arc::clone(source);
            workers.spawn(async move {
                tracing::info!(source = %source_id, "attempting to GET KEY");
                let mut guard = source.lock().await;
                match guard.get().await {
                    Ok(key) => {
                        tracing::info!(source = %source_id, "obtained key");
                        Some((source_id, key))
                    }
                    Err(e) => {
                        tracing::error!(source = %source_id, "failed GET KEY: {}", e);
                        None
                    }
                }
            });
        }

        let mut results: HashMap<String, Vec<u8>> = HashMap::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Some((source_id, key))) => {
                    results.insert(source_id, key);
                }
                Ok(None) => {}
                Err(e) => tracing::error!("source worker failed to run: {}", e),
            }
        }

        if results.is_empty() {
            return json!({
                "status": 1,
                "message": "Failed to fetch any keys from sources",
            });
        }

        match hybridize_results(results, &self.peer.shared_seed, self.hybrid_method, &qos) {
            Ok(hybrid_key) => {
                tracing::info!(method = %self.hybrid_method, "keys successfully hybridized");
                json!({"status": 0, "key_buffer": hybrid_key})
            }
            Err(e) => {
                tracing::error!("hybridization failed: {}", e);
                json!({"status": 1, "message": e.to_string()})
            }
        }
    }

    /// Handle CLOSE: release every source, ignoring their errors
    pub async fn close(&mut self, _request: &CloseRequest) -> Value {
        let mut workers = JoinSet::new();
        for (source_id, source) in &self.sources {
            let source_id = source_id.clone();
            let source = Arc::clone(source);
            workers.spawn(async move {
                tracing::info!(source = %source_id, "attempting to CLOSE");
                source.lock().await.close().await;
                tracing::info!(source = %source_id, "source closed");
            });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("source worker failed to run: {}", e);
            }
        }

        json!({"status": 0})
    }
}

/// Combine the per-source secrets into the final hybrid key.
///
/// With a single live secret, a deterministic auxiliary key of the same
/// length joins the set first (the combiners need two inputs, and the
/// auxiliary is identical on both peers). Secrets are sorted lexicographically
/// so both peers feed the combiners the same sequence, then truncated to the
/// QoS chunk size.
fn hybridize_results(
    mut results: HashMap<String, Vec<u8>>,
    shared_seed: &str,
    method: HybridizationMethod,
    qos: &OpenConnectQos,
) -> Result<Vec<u8>> {
    let chunk_size = qos.chunk_size()?;

    if results.len() < 2 {
        let key_length = results
            .values()
            .next()
            .map(Vec::len)
            .ok_or(braid_crypto::CryptoError::EmptyInput)?;
        let aux_key = deterministic_aux_key(shared_seed, key_length);
        tracing::debug!(
            "single-key hybridization not allowed, deterministic aux key added"
        );
        results.insert(AUX_SOURCE_ID.to_string(), aux_key);
    }

    let mut keys: Vec<Vec<u8>> = results.into_values().collect();
    keys.sort();

    let mut hybrid_key = match method {
        HybridizationMethod::Xor => xor_keys(&keys, chunk_size)?,
        HybridizationMethod::Hmac => hmac_keys(&keys)?,
        HybridizationMethod::XorHmac => xor_hmac_keys(&keys, chunk_size)?,
    };
    hybrid_key.truncate(chunk_size);
    Ok(hybrid_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_crypto::seed::deterministic_aux_key;

    fn qos(chunk_size: i64) -> OpenConnectQos {
        OpenConnectQos {
            key_chunk_size: chunk_size,
            max_bps: 32000,
            min_bps: 32000,
            jitter: 10,
            priority: 0,
            timeout: 0,
            ttl: 3600,
            metadata_mimetype: "application/json".to_string(),
        }
    }

    #[test]
    fn two_sources_hybridize_at_chunk_size() {
        let mut results = HashMap::new();
        results.insert("QKD-1".to_string(), vec![0x01, 0x02]);
        results.insert("PQC-1".to_string(), vec![0xFF, 0x00]);

        let key =
            hybridize_results(results, "seed", HybridizationMethod::Xor, &qos(2)).unwrap();
        assert_eq!(key, vec![0xFE, 0x02]);
    }

    #[test]
    fn single_source_gets_the_deterministic_aux() {
        let secret = vec![0xAA; 32];
        let mut results = HashMap::new();
        results.insert("PQC-1".to_string(), secret.clone());

        let key = hybridize_results(
            results,
            "abc",
            HybridizationMethod::Xor,
            &qos(32),
        )
        .unwrap();

        // aux is SHA-256("abc") expanded to the secret's length
        let aux = deterministic_aux_key("abc", 32);
        let expected: Vec<u8> = secret.iter().zip(aux.iter()).map(|(a, b)| a ^ b).collect();
        assert_eq!(key, expected);
    }

    #[test]
    fn result_order_does_not_matter() {
        // HashMap iteration order is arbitrary; sorting makes the outcome
        // stable no matter which source answered first
        let mut forward = HashMap::new();
        forward.insert("a".to_string(), vec![9u8; 16]);
        forward.insert("b".to_string(), vec![3u8; 16]);
        let mut backward = HashMap::new();
        backward.insert("a".to_string(), vec![3u8; 16]);
        backward.insert("b".to_string(), vec![9u8; 16]);

        let first =
            hybridize_results(forward, "s", HybridizationMethod::Hmac, &qos(16)).unwrap();
        let second =
            hybridize_results(backward, "s", HybridizationMethod::Hmac, &qos(16)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn hmac_output_is_truncated_to_the_chunk_size() {
        let mut results = HashMap::new();
        results.insert("a".to_string(), vec![1u8; 8]);
        results.insert("b".to_string(), vec![2u8; 8]);

        let key =
            hybridize_results(results, "s", HybridizationMethod::Hmac, &qos(16)).unwrap();
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn invalid_chunk_size_is_reported() {
        let mut results = HashMap::new();
        results.insert("a".to_string(), vec![1u8; 8]);
        assert!(matches!(
            hybridize_results(results, "s", HybridizationMethod::Xor, &qos(0)),
            Err(ProtocolError::InvalidChunkSize(0))
        ));
    }
}
