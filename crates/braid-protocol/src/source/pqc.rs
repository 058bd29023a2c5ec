//! Post-quantum KEM key source
//!
//! Runs one KEM handshake per `get` over a secure stream claimed from the
//! peer-connection manager. The CLIENT role encapsulates nothing itself: it
//! generates the keypair, ships the public key, and decapsulates the returned
//! ciphertext; the SERVER role does the encapsulation. Reads are byte-exact
//! against the lengths the KEM advertises.

use crate::error::{ProtocolError, Result};
use crate::model::{KeyType, OpenConnectQos};
use crate::source::KeySource;
use async_trait::async_trait;
use braid_crypto::{Kem, KemAlgorithm};
use braid_net::{
    ConnectionRole, NetworkAddress, PeerConnectionManager, PeerSessionReference, PeerSessionType,
    PeerStream,
};
use std::sync::Arc;
use uuid::Uuid;

/// Key source backed by a KEM exchange with the partner daemon
pub struct PqcSource {
    id: String,
    peer_manager: Arc<PeerConnectionManager>,
    peer_address: NetworkAddress,
    role: ConnectionRole,
    algorithm: KemAlgorithm,
    appearance_index: usize,
    kem: Option<Kem>,
    stream: Option<PeerStream>,
    key_stream_id: Option<String>,
}

impl PqcSource {
    /// Build the source for one KEM algorithm of one session.
    ///
    /// `appearance_index` is the 0-based rank of this source among the
    /// session's sources sharing the same algorithm, so that both peers name
    /// the same sub-session even when an algorithm is requested twice.
    pub fn new(
        peer_manager: Arc<PeerConnectionManager>,
        peer_address: NetworkAddress,
        role: ConnectionRole,
        algorithm: KemAlgorithm,
        appearance_index: usize,
    ) -> Result<Self> {
        let id = format!("{}-{}", KeyType::Pqc, Uuid::new_v4());
        tracing::debug!(
            id = %id,
            role = %role,
            algorithm = %algorithm,
            appearance_index,
            "initializing PQC source"
        );

        Ok(Self {
            id,
            peer_manager,
            peer_address,
            role,
            algorithm,
            appearance_index,
            kem: Some(Kem::new(algorithm)?),
            stream: None,
            key_stream_id: None,
        })
    }

    async fn client_side_get(kem: &Kem, stream: &mut PeerStream) -> Result<Vec<u8>> {
        let (public_key, secret_key) = kem.keypair()?;
        tracing::debug!("[CLIENT] public key generated, sending it to the server");
        stream.write_all(&public_key).await?;

        let ciphertext = stream.read_exact(kem.ciphertext_len()).await?;
        tracing::debug!("[CLIENT] received ciphertext, starting decapsulation");

        let shared_secret = kem.decapsulate(&secret_key, &ciphertext)?;
        tracing::debug!("[CLIENT] shared secret decapsulated");
        Ok(shared_secret.to_vec())
    }

    async fn server_side_get(kem: &Kem, stream: &mut PeerStream) -> Result<Vec<u8>> {
        let public_key = stream.read_exact(kem.public_key_len()).await?;
        tracing::debug!("[SERVER] received public key, encapsulating secret");

        let (ciphertext, shared_secret) = kem.encapsulate(&public_key)?;
        stream.write_all(&ciphertext).await?;
        tracing::debug!("[SERVER] ciphertext sent to the client");
        Ok(shared_secret.to_vec())
    }
}

#[async_trait]
impl KeySource for PqcSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn key_type(&self) -> KeyType {
        KeyType::Pqc
    }

    async fn open(&mut self, hybrid_ksid: &str, _qos: &OpenConnectQos) -> Result<()> {
        let reference = PeerSessionReference::new(
            PeerSessionType::Pqc,
            format!("{}-{}-{}", self.algorithm, self.appearance_index, hybrid_ksid),
        );
        let stream = self
            .peer_manager
            .connect_peer(&reference, self.role, &self.peer_address)
            .await?;

        self.stream = Some(stream);
        self.key_stream_id = Some(hybrid_ksid.to_string());
        Ok(())
    }

    async fn get(&mut self) -> Result<Vec<u8>> {
        let kem = self
            .kem
            .as_ref()
            .ok_or_else(|| ProtocolError::Pqc(format!("[{}] KEM already released", self.role)))?;
        let stream = self.stream.as_mut().ok_or_else(|| {
            ProtocolError::Pqc(format!("[{}] secure stream not established", self.role))
        })?;

        let result = match self.role {
            ConnectionRole::Client => Self::client_side_get(kem, stream).await,
            ConnectionRole::Server => Self::server_side_get(kem, stream).await,
        };

        result.map_err(|e| {
            tracing::error!(
                role = %self.role,
                key_stream_id = self.key_stream_id.as_deref().unwrap_or("-"),
                "failure getting key: {}", e
            );
            ProtocolError::Pqc(format!("[{}] {}", self.role, e))
        })
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await;
            tracing::debug!(id = %self.id, "secure stream closed");
        }
        self.kem = None;
    }
}
