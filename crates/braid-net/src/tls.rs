//! Mutual-TLS configuration from operator-provisioned PEM files
//!
//! Both daemons authenticate each other at the TLS layer: the listener
//! requires a client certificate chained to the shared CA, and the dialer
//! verifies the listener against the same CA while presenting its own node
//! certificate.

use crate::{NetError, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Certificate material for one node, as referenced by the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// IP subject-alternative-name baked into the node certificate
    pub certificate_ip: String,
    /// CA bundle both peers chain to
    pub cert_authority_path: PathBuf,
    /// This node's certificate chain
    pub cert_path: PathBuf,
    /// This node's private key
    pub key_path: PathBuf,
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| NetError::TlsError(format!("cannot open {}: {}", path.display(), e)))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<_>>()
        .map_err(|e| NetError::TlsError(format!("bad certificate in {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(NetError::TlsError(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| NetError::TlsError(format!("cannot open {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| NetError::TlsError(format!("bad private key in {}: {}", path.display(), e)))?
        .ok_or_else(|| NetError::TlsError(format!("no private key found in {}", path.display())))
}

fn ca_root_store(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| NetError::TlsError(format!("rejected CA certificate: {}", e)))?;
    }
    Ok(roots)
}

/// Build the rustls ServerConfig for the peer listener (client certs required)
pub fn server_config(config: &CertificateConfig) -> Result<Arc<rustls::ServerConfig>> {
    let roots = ca_root_store(&config.cert_authority_path)?;
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| NetError::TlsError(format!("client verifier build failed: {}", e)))?;

    let server = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(
            load_certs(&config.cert_path)?,
            load_private_key(&config.key_path)?,
        )
        .map_err(|e| NetError::TlsError(format!("server config failed: {}", e)))?;

    Ok(Arc::new(server))
}

/// Build the rustls ClientConfig for outbound peer streams (node cert presented)
pub fn client_config(config: &CertificateConfig) -> Result<Arc<rustls::ClientConfig>> {
    let roots = ca_root_store(&config.cert_authority_path)?;

    let client = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(
            load_certs(&config.cert_path)?,
            load_private_key(&config.key_path)?,
        )
        .map_err(|e| NetError::TlsError(format!("client config failed: {}", e)))?;

    Ok(Arc::new(client))
}
