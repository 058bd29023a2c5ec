//! Agent-facing dispatcher
//!
//! Accepts local agent connections, reads one JSON object per message, and
//! routes by `command`: OPEN_CONNECT constructs a session, GET_KEY and CLOSE
//! resolve an existing one by its hybrid KSID. The session registry lives
//! behind one coarse lock; each session serializes its own requests through
//! the `Arc<Mutex<_>>` entry, which is resolved under the registry lock and
//! then locked after the registry lock is released.

use crate::config::GeneralConfiguration;
use braid_net::PeerConnectionManager;
use braid_protocol::model::{CloseRequest, GetKeyRequest, OpenConnectRequest, PeerInfo};
use braid_protocol::Session;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Semaphore};

/// Upper bound on one agent message
const AGENT_MESSAGE_MAX_BYTES: usize = 65_057;
/// Bound on concurrently-served agent connections
const AGENT_WORKERS: usize = 10;

/// Process-wide daemon state
pub struct Server {
    config: GeneralConfiguration,
    peers_info: HashMap<String, PeerInfo>,
    peer_manager: Arc<PeerConnectionManager>,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl Server {
    /// Build the daemon state, including the peer-connection manager
    pub fn new(
        config: GeneralConfiguration,
        peers_info: HashMap<String, PeerInfo>,
    ) -> anyhow::Result<Arc<Self>> {
        let peer_manager = Arc::new(PeerConnectionManager::new(
            config.peer_local_address.clone(),
            &config.certificate_config,
        )?);

        Ok(Arc::new(Self {
            config,
            peers_info,
            peer_manager,
            sessions: Mutex::new(HashMap::new()),
        }))
    }

    /// Bind the agent-facing listener
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let listener =
            TcpListener::bind(self.config.hybridization_server_address.to_pair()).await?;
        tracing::info!(
            address = %self.config.hybridization_server_address,
            "server listening for agents"
        );
        Ok(listener)
    }

    /// Start the peer listener and serve agent connections until failure
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        self.peer_manager.start_listening().await?;

        let workers = Arc::new(Semaphore::new(AGENT_WORKERS));
        loop {
            let (stream, addr) = listener.accept().await?;
            let permit = Arc::clone(&workers).acquire_owned().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let _permit = permit;
                server.handle_connection(stream, addr).await;
            });
        }
    }

    /// Stop the peer listener
    pub async fn shutdown(&self) {
        self.peer_manager.stop_listening().await;
    }

    /// Serve one agent connection: request in, response out, until EOF
    async fn handle_connection(&self, mut stream: TcpStream, addr: SocketAddr) {
        tracing::info!(agent = %addr, "connection established with agent");

        let mut buf = vec![0u8; AGENT_MESSAGE_MAX_BYTES];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => {
                    tracing::info!(agent = %addr, "connection closed by agent");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(agent = %addr, "failed to read from agent: {}", e);
                    break;
                }
            };

            let response = match serde_json::from_slice::<Value>(&buf[..n]) {
                Ok(request) => self.process_request(request).await,
                Err(_) => json!({"status": "error", "message": "Invalid JSON received"}),
            };

            match response.get("status") {
                Some(status) => {
                    tracing::info!(agent = %addr, status = %status, "sending response")
                }
                None => tracing::warn!(agent = %addr, "sending response without status"),
            }

            if let Err(e) = stream.write_all(response.to_string().as_bytes()).await {
                tracing::error!(agent = %addr, "failed to write to agent: {}", e);
                break;
            }
        }

        tracing::info!(agent = %addr, "request flow with agent completed");
    }

    /// Route one decoded request by its `command`
    pub async fn process_request(&self, request: Value) -> Value {
        let command = request.get("command").and_then(Value::as_str);
        let data = request.get("data").cloned().unwrap_or_else(|| json!({}));
        tracing::info!(command = command.unwrap_or("<missing>"), "received request");

        match command {
            Some("OPEN_CONNECT") => self.open_connect(data).await,
            Some("GET_KEY") => self.get_key(data).await,
            Some("CLOSE") => self.close(data).await,
            _ => json!({"status": "error", "message": "Unknown command"}),
        }
    }

    async fn open_connect(&self, data: Value) -> Value {
        match self.try_open_connect(data).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("exception during OPEN_CONNECT: {:#}", e);
                json!({"status": 1, "message": "Fatal error during OPEN_CONNECT."})
            }
        }
    }

    async fn try_open_connect(&self, data: Value) -> anyhow::Result<Value> {
        let oc_request: OpenConnectRequest = serde_json::from_value(data)?;
        let uri_params = oc_request.uri_parameters()?;

        let mut session = Session::new(
            &self.config.node(),
            &self.peers_info,
            Arc::clone(&self.peer_manager),
            &uri_params,
        )?;
        tracing::info!("initializing new ETSI-004 session");

        let response = session.open_connect(&oc_request).await;
        if response["status"] == 0 {
            if let Some(ksid) = response["key_stream_id"].as_str() {
                self.sessions
                    .lock()
                    .await
                    .insert(ksid.to_string(), Arc::new(Mutex::new(session)));
            }
        }

        tracing::info!(status = %response["status"], "OPEN_CONNECT finished");
        Ok(response)
    }

    async fn get_key(&self, data: Value) -> Value {
        let gk_request: GetKeyRequest = match serde_json::from_value(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("exception during GET_KEY: {}", e);
                return json!({"status": 1, "message": "Fatal error during GET_KEY."});
            }
        };

        // Resolve under the registry lock, run under the session lock
        let session = self
            .sessions
            .lock()
            .await
            .get(&gk_request.key_stream_id)
            .cloned();
        let Some(session) = session else {
            return json!({
                "status": 1,
                "message": "No interface selected. OPEN_CONNECT must be called first.",
            });
        };

        tracing::info!(key_stream_id = %gk_request.key_stream_id, "routing GET_KEY");
        let result = session.lock().await.get_key(&gk_request).await;
        result
    }

    async fn close(&self, data: Value) -> Value {
        let cl_request: CloseRequest = match serde_json::from_value(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("exception during CLOSE: {}", e);
                return json!({"status": 1, "message": "Fatal error during CLOSE."});
            }
        };

        // Pop the entry before releasing the registry lock
        let session = self
            .sessions
            .lock()
            .await
            .remove(&cl_request.key_stream_id);
        let Some(session) = session else {
            return json!({
                "status": 1,
                "message": "No interface selected. OPEN_CONNECT must be called first.",
            });
        };

        tracing::info!(key_stream_id = %cl_request.key_stream_id, "routing CLOSE");
        let result = session.lock().await.close(&cl_request).await;
        result
    }

    /// Number of open sessions (for tests and introspection)
    pub async fn open_session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
