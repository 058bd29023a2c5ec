//! # Braid Networking Layer
//!
//! Peer-facing plumbing for the hybrid key-derivation daemon: network
//! addresses, mutual-TLS configuration from operator-provisioned PEM files,
//! and the peer-connection manager that rendezvouses named sub-sessions
//! between the two daemons.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod addr;
pub mod error;
pub mod peer;
pub mod tls;

pub use addr::NetworkAddress;
pub use error::{NetError, Result};
pub use peer::{
    ConnectionRole, PeerConnectionManager, PeerSessionReference, PeerSessionType, PeerStream,
};
pub use tls::CertificateConfig;
