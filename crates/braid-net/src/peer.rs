//! Peer-connection manager
//!
//! A single process-wide component that pairs the two daemons. The listener
//! side accepts mutually-authenticated TLS streams, reads one reference
//! message, and parks the stream in a shared pool; sessions then claim the
//! stream for the sub-session named by that reference. The dialing side opens
//! the TLS stream and announces the reference itself.

use crate::{tls, CertificateConfig, NetError, NetworkAddress, Result};
use rustls::pki_types::ServerName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

/// Per-operation deadline on established peer streams
const PEER_IO_DEADLINE: Duration = Duration::from_secs(10);
/// How long the SERVER role waits for the partner to start a session
const CLAIM_TIMEOUT: Duration = Duration::from_secs(10);
/// Poll cadence while waiting for an unclaimed stream
const CLAIM_POLL: Duration = Duration::from_millis(200);
/// Bound on concurrent inbound-registration workers
const LISTENER_WORKERS: usize = 5;
/// Upper bound on the reference announcement message
const REFERENCE_MAX_BYTES: usize = 1024;
/// Upper bound on the `ok` acknowledgement
const ACK_MAX_BYTES: usize = 256;

/// Which end of a peer sub-session this daemon plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// The daemon on the source-uuid node
    Client,
    /// The daemon on the destination-uuid node
    Server,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("CLIENT"),
            Self::Server => f.write_str("SERVER"),
        }
    }
}

/// Kind of traffic a peer sub-session carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerSessionType {
    /// Round-trip that only unblocks the accept loop at shutdown
    Blink,
    /// 16 raw bytes, client to server: the hybrid KSID
    ShareKsid,
    /// A KEM transcript (public key one way, ciphertext back)
    Pqc,
}

impl PeerSessionType {
    /// Wire discriminant carried in the reference message
    pub fn code(&self) -> u8 {
        match self {
            Self::Blink => 0,
            Self::ShareKsid => 1,
            Self::Pqc => 2,
        }
    }

    /// Decode a wire discriminant
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Blink),
            1 => Some(Self::ShareKsid),
            2 => Some(Self::Pqc),
            _ => None,
        }
    }
}

impl fmt::Display for PeerSessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blink => f.write_str("BLINK"),
            Self::ShareKsid => f.write_str("SHARE_KSID"),
            Self::Pqc => f.write_str("PQC"),
        }
    }
}

/// Unique name of one sub-session over the peer channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerSessionReference {
    /// Traffic kind
    pub session_type: PeerSessionType,
    /// Sub-session id, agreed by both peers
    pub id: String,
}

impl PeerSessionReference {
    /// Build a reference from its parts
    pub fn new(session_type: PeerSessionType, id: impl Into<String>) -> Self {
        Self {
            session_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for PeerSessionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_type, self.id)
    }
}

/// First message on every peer stream, dialer to listener
#[derive(Serialize, Deserialize)]
struct ReferenceMessage {
    session_type: u8,
    id: String,
}

/// A mutually-authenticated peer stream with a per-operation deadline
pub struct PeerStream {
    stream: TlsStream<TcpStream>,
    deadline: Duration,
}

impl PeerStream {
    fn new(stream: impl Into<TlsStream<TcpStream>>) -> Self {
        Self {
            stream: stream.into(),
            deadline: PEER_IO_DEADLINE,
        }
    }

    /// Write the whole buffer or fail within the deadline
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        timeout(self.deadline, self.stream.write_all(data))
            .await
            .map_err(|_| NetError::Timeout)??;
        Ok(())
    }

    /// Read exactly `len` bytes or fail within the deadline
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        timeout(self.deadline, self.stream.read_exact(&mut buf))
            .await
            .map_err(|_| NetError::Timeout)??;
        Ok(buf)
    }

    /// Read whatever arrives next, up to `max` bytes
    pub async fn read_up_to(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        let n = timeout(self.deadline, self.stream.read(&mut buf))
            .await
            .map_err(|_| NetError::Timeout)??;
        buf.truncate(n);
        Ok(buf)
    }

    /// Close the stream, ignoring errors on the way down
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

impl fmt::Debug for PeerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerStream")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Process-wide rendezvous point for peer sub-sessions
pub struct PeerConnectionManager {
    address: NetworkAddress,
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    unclaimed: Arc<Mutex<HashMap<PeerSessionReference, PeerStream>>>,
    stop: Arc<AtomicBool>,
    bound_port: std::sync::atomic::AtomicU16,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PeerConnectionManager {
    /// Build the manager for the local peer address and certificate material
    pub fn new(address: NetworkAddress, certs: &CertificateConfig) -> Result<Self> {
        Ok(Self {
            address,
            acceptor: TlsAcceptor::from(tls::server_config(certs)?),
            connector: TlsConnector::from(tls::client_config(certs)?),
            unclaimed: Arc::new(Mutex::new(HashMap::new())),
            stop: Arc::new(AtomicBool::new(false)),
            bound_port: std::sync::atomic::AtomicU16::new(0),
            listener: Mutex::new(None),
        })
    }

    /// Start the background listener that registers inbound peer streams.
    ///
    /// Returns the actually-bound address (the configured port may be 0).
    pub async fn start_listening(&self) -> Result<std::net::SocketAddr> {
        let mut slot = self.listener.lock().await;
        if slot.is_some() {
            tracing::warn!("peer connection manager is already listening");
            return Err(NetError::ConnectionFailed(
                "peer listener already running".into(),
            ));
        }

        let listener = TcpListener::bind(self.address.to_pair()).await?;
        let bound = listener.local_addr()?;
        self.bound_port.store(bound.port(), Ordering::SeqCst);
        tracing::info!(address = %bound, "listening for peer daemons");

        self.stop.store(false, Ordering::SeqCst);
        *slot = Some(tokio::spawn(accept_loop(
            listener,
            self.acceptor.clone(),
            Arc::clone(&self.unclaimed),
            Arc::clone(&self.stop),
        )));
        Ok(bound)
    }

    /// Stop accepting new peer sessions; already-parked streams stay claimable
    pub async fn stop_listening(&self) {
        let handle = self.listener.lock().await.take();
        let Some(handle) = handle else {
            tracing::warn!("peer connection manager is not listening");
            return;
        };

        self.stop.store(true, Ordering::SeqCst);

        // Self-connect so the blocked accept returns and observes the flag.
        // The wildcard listen address is not dialable, so blink loops back.
        let host = if self.address.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            self.address.host.as_str()
        };
        let target = NetworkAddress::new(host, self.bound_port.load(Ordering::SeqCst));
        let blink = PeerSessionReference::new(PeerSessionType::Blink, "blink");
        if let Err(e) = self.connect_as_client(&blink, &target).await {
            tracing::debug!("blink connection failed during shutdown: {}", e);
        }

        if handle.await.is_err() {
            tracing::error!("peer listener task panicked");
        }
        tracing::info!("peer connection manager stopped listening");
    }

    /// Obtain the secure stream bound to `session_ref`.
    ///
    /// The CLIENT role dials `target` and announces the reference; the SERVER
    /// role waits for the listener to have parked the matching inbound stream.
    pub async fn connect_peer(
        &self,
        session_ref: &PeerSessionReference,
        role: ConnectionRole,
        target: &NetworkAddress,
    ) -> Result<PeerStream> {
        match role {
            ConnectionRole::Server => self.claim_inbound(session_ref).await,
            ConnectionRole::Client => self.connect_as_client(session_ref, target).await,
        }
    }

    async fn claim_inbound(&self, session_ref: &PeerSessionReference) -> Result<PeerStream> {
        tracing::debug!(reference = %session_ref, "waiting for the client peer to start the session");
        let deadline = Instant::now() + CLAIM_TIMEOUT;

        while Instant::now() < deadline {
            let claimed = self.unclaimed.lock().await.remove(session_ref);
            if let Some(mut stream) = claimed {
                stream.write_all(b"ok").await?;
                tracing::info!(reference = %session_ref, "peer session established");
                return Ok(stream);
            }
            sleep(CLAIM_POLL).await;
        }

        tracing::error!(
            reference = %session_ref,
            "client peer did not connect within {:?}", CLAIM_TIMEOUT
        );
        Err(NetError::PeerNotConnected(format!(
            "the client peer did not start session {}",
            session_ref
        )))
    }

    async fn connect_as_client(
        &self,
        session_ref: &PeerSessionReference,
        target: &NetworkAddress,
    ) -> Result<PeerStream> {
        let message = serde_json::to_vec(&ReferenceMessage {
            session_type: session_ref.session_type.code(),
            id: session_ref.id.clone(),
        })
        .map_err(|e| NetError::InvalidReference(e.to_string()))?;

        let tcp = timeout(PEER_IO_DEADLINE, TcpStream::connect(target.to_pair()))
            .await
            .map_err(|_| NetError::Timeout)??;

        let server_name = ServerName::try_from(target.host.clone())
            .map_err(|e| NetError::TlsError(format!("invalid peer host name: {}", e)))?;
        let tls = timeout(PEER_IO_DEADLINE, self.connector.connect(server_name, tcp))
            .await
            .map_err(|_| NetError::Timeout)?
            .map_err(|e| NetError::TlsError(format!("peer handshake failed: {}", e)))?;

        let mut stream = PeerStream::new(tls);
        stream.write_all(&message).await?;
        stream.read_up_to(ACK_MAX_BYTES).await?;

        tracing::info!(reference = %session_ref, peer = %target, "peer session established");
        Ok(stream)
    }
}

impl fmt::Debug for PeerConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnectionManager")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    unclaimed: Arc<Mutex<HashMap<PeerSessionReference, PeerStream>>>,
    stop: Arc<AtomicBool>,
) {
    let workers = Arc::new(Semaphore::new(LISTENER_WORKERS));

    loop {
        let (tcp, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!("failed to accept peer connection: {}", e);
                continue;
            }
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break;
        };
        let acceptor = acceptor.clone();
        let unclaimed = Arc::clone(&unclaimed);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = register_inbound(acceptor, tcp, unclaimed).await {
                tracing::error!(peer = %remote, "failed to register peer connection: {}", e);
            }
        });
    }
}

async fn register_inbound(
    acceptor: TlsAcceptor,
    tcp: TcpStream,
    unclaimed: Arc<Mutex<HashMap<PeerSessionReference, PeerStream>>>,
) -> Result<()> {
    let tls = timeout(PEER_IO_DEADLINE, acceptor.accept(tcp))
        .await
        .map_err(|_| NetError::Timeout)?
        .map_err(|e| NetError::TlsError(format!("peer handshake failed: {}", e)))?;

    let mut stream = PeerStream::new(tls);
    let raw = stream.read_up_to(REFERENCE_MAX_BYTES).await?;
    let message: ReferenceMessage = serde_json::from_slice(&raw)
        .map_err(|e| NetError::InvalidReference(e.to_string()))?;

    let session_type = PeerSessionType::from_code(message.session_type).ok_or_else(|| {
        NetError::InvalidReference(format!("unknown session type {}", message.session_type))
    })?;
    if session_type == PeerSessionType::Blink {
        tracing::debug!("the peer listener blinked");
        return Ok(());
    }

    let reference = PeerSessionReference::new(session_type, message.id);
    tracing::info!(reference = %reference, "peer connection registered");
    unclaimed.lock().await.insert(reference, stream);
    Ok(())
}
