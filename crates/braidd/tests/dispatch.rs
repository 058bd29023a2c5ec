//! End-to-end dispatcher tests
//!
//! Boots two full daemons on loopback (mutual-TLS peer channel, mock QKD) and
//! drives them through real agent sockets: OPEN_CONNECT on both ends, GET_KEY,
//! CLOSE, plus the error paths that must leave the agent connection open.

use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const UUID_A: &str = "1984afe6-533b-4a1f-9e45-bd1f15cd4409";
const UUID_B: &str = "20837bb6-aac1-4eb2-be87-ab5bb0f124b5";

fn mint_certificates(dir: &Path) -> Value {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let node_key = KeyPair::generate().unwrap();
    let node_params = CertificateParams::new(vec!["127.0.0.1".to_string()]).unwrap();
    let node_cert = node_params.signed_by(&node_key, &ca_cert, &ca_key).unwrap();

    let ca_path = dir.join("ca.pem");
    let cert_path = dir.join("node.pem");
    let key_path = dir.join("node.key");
    std::fs::write(&ca_path, ca_cert.pem()).unwrap();
    std::fs::write(&cert_path, node_cert.pem()).unwrap();
    std::fs::write(&key_path, node_key.serialize_pem()).unwrap();

    json!({
        "certificate_ip": "127.0.0.1",
        "cert_authority_path": ca_path,
        "cert_path": cert_path,
        "key_path": key_path,
    })
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

struct TestDaemon {
    server: Arc<braidd::Server>,
    agent_addr: SocketAddr,
}

/// Build one daemon with silent logging and the mock QKD stack
async fn boot_daemon(
    dir: &TempDir,
    certificate_config: &Value,
    uuid: &str,
    peer_port: u16,
    partner_uuid: &str,
    partner_peer_port: u16,
) -> TestDaemon {
    let config = json!({
        "uuid": uuid,
        "logging_config": {
            "console_log_type": "NONE",
            "colorless_console_log": true,
            "file_log_type": "NONE",
            "filename": dir.path().join("braidd.log"),
        },
        "certificate_config": certificate_config,
        "hybridization_server_address": {"host": "127.0.0.1", "port": 0},
        "peer_local_address": {"host": "127.0.0.1", "port": peer_port},
        "qkd_address": {"host": "127.0.0.1", "port": 1},
        "mock_qkd": true,
    });
    let peers = json!({
        partner_uuid: {
            "address": {"host": "127.0.0.1", "port": partner_peer_port},
            "shared_seed": "dispatch-test-seed",
        },
    });

    let general: braidd::GeneralConfiguration = serde_json::from_value(config).unwrap();
    let peers_info: HashMap<String, braidd::PeerInfo> = serde_json::from_value(peers).unwrap();

    let server = braidd::Server::new(general, peers_info).unwrap();
    let listener = server.bind().await.unwrap();
    let agent_addr = listener.local_addr().unwrap();
    tokio::spawn(Arc::clone(&server).serve(listener));

    // Wait until the peer listener accepts before letting agents in
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", peer_port)).await.is_ok() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    TestDaemon { server, agent_addr }
}

async fn boot_daemon_pair(dir: &TempDir) -> (TestDaemon, TestDaemon) {
    let certs = mint_certificates(dir.path());
    let (peer_a, peer_b) = (free_port(), free_port());
    let daemon_a = boot_daemon(dir, &certs, UUID_A, peer_a, UUID_B, peer_b).await;
    let daemon_b = boot_daemon(dir, &certs, UUID_B, peer_b, UUID_A, peer_a).await;
    (daemon_a, daemon_b)
}

/// One pipelined request/response round on an agent connection
async fn send(stream: &mut TcpStream, payload: &[u8]) -> Value {
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; 65_057];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(n > 0, "daemon closed the agent connection");
    serde_json::from_slice(&buf[..n]).unwrap()
}

fn open_connect(key_sources: &str, hybridization: &str) -> Value {
    json!({
        "command": "OPEN_CONNECT",
        "data": {
            "source": format!(
                "qkd://Application1@{}?hybridization={}&key_sources={}",
                UUID_A, hybridization, key_sources
            ),
            "destination": format!("qkd://Application4@{}", UUID_B),
            "qos": {
                "key_chunk_size": 32,
                "max_bps": 32000,
                "min_bps": 32000,
                "jitter": 10,
                "priority": 0,
                "timeout": 0,
                "ttl": 3600,
                "metadata_mimetype": "application/json",
            },
        },
    })
}

/// Drive one daemon's agent socket through open / get / close
async fn run_agent_cycle(daemon: &TestDaemon, request: Value) -> (String, Vec<u8>) {
    let mut agent = TcpStream::connect(daemon.agent_addr).await.unwrap();

    let response = send(&mut agent, request.to_string().as_bytes()).await;
    assert_eq!(response["status"], 0, "OPEN_CONNECT failed: {}", response);
    let ksid = response["key_stream_id"].as_str().unwrap().to_string();
    assert_eq!(daemon.server.open_session_count().await, 1);

    let get = json!({
        "command": "GET_KEY",
        "data": {"key_stream_id": ksid, "index": 0},
    });
    let response = send(&mut agent, get.to_string().as_bytes()).await;
    assert_eq!(response["status"], 0, "GET_KEY failed: {}", response);
    let key_buffer: Vec<u8> = response["key_buffer"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_u64().unwrap() as u8)
        .collect();

    let close = json!({
        "command": "CLOSE",
        "data": {"key_stream_id": ksid},
    });
    let response = send(&mut agent, close.to_string().as_bytes()).await;
    assert_eq!(response["status"], 0, "CLOSE failed: {}", response);
    assert_eq!(daemon.server.open_session_count().await, 0);

    (ksid, key_buffer)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_daemons_serve_matching_keys_to_their_agents() {
    let dir = TempDir::new().unwrap();
    let (daemon_a, daemon_b) = boot_daemon_pair(&dir).await;

    let request = open_connect("Kyber512", "xoring");
    let side_a = tokio::spawn({
        let request = request.clone();
        async move { run_agent_cycle(&daemon_a, request).await }
    });
    let side_b = tokio::spawn(async move { run_agent_cycle(&daemon_b, request).await });

    let (ksid_a, key_a) = side_a.await.unwrap();
    let (ksid_b, key_b) = side_b.await.unwrap();

    assert_eq!(ksid_a, ksid_b, "both agents must see the same hybrid KSID");
    assert_eq!(key_a, key_b, "both agents must receive identical keys");
    assert_eq!(key_a.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn protocol_errors_leave_the_agent_connection_open() {
    let dir = TempDir::new().unwrap();
    let (daemon_a, _daemon_b) = boot_daemon_pair(&dir).await;

    let mut agent = TcpStream::connect(daemon_a.agent_addr).await.unwrap();

    let response = send(&mut agent, br#"{"command": "PING"}"#).await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "Unknown command");

    let response = send(&mut agent, b"{definitely not json").await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "Invalid JSON received");

    let orphan_get = json!({
        "command": "GET_KEY",
        "data": {"key_stream_id": "no-such-stream", "index": 0},
    });
    let response = send(&mut agent, orphan_get.to_string().as_bytes()).await;
    assert_eq!(response["status"], 1);
    assert_eq!(
        response["message"],
        "No interface selected. OPEN_CONNECT must be called first."
    );

    // The connection survived all three errors
    let response = send(&mut agent, br#"{"command": "PING"}"#).await;
    assert_eq!(response["status"], "error");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_open_connect_reports_a_fatal_error() {
    let dir = TempDir::new().unwrap();
    let (daemon_a, _daemon_b) = boot_daemon_pair(&dir).await;

    let mut agent = TcpStream::connect(daemon_a.agent_addr).await.unwrap();

    let request = json!({
        "command": "OPEN_CONNECT",
        "data": {"source": "quite-wrong"},
    });
    let response = send(&mut agent, request.to_string().as_bytes()).await;
    assert_eq!(response["status"], 1);
    assert_eq!(response["message"], "Fatal error during OPEN_CONNECT.");
    assert_eq!(daemon_a.server.open_session_count().await, 0);
}
