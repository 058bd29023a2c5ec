//! Network error types

use std::fmt;

/// Result type alias using NetError
pub type Result<T> = std::result::Result<T, NetError>;

/// Network layer errors
#[derive(Debug)]
pub enum NetError {
    /// Connection failed to establish
    ConnectionFailed(String),
    /// Operation exceeded its deadline
    Timeout,
    /// The partner daemon never claimed the session
    PeerNotConnected(String),
    /// TLS configuration or handshake error
    TlsError(String),
    /// Malformed peer-session reference message
    InvalidReference(String),
    /// IO error
    Io(std::io::Error),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            Self::Timeout => write!(f, "Operation timed out"),
            Self::PeerNotConnected(msg) => write!(f, "Peer not connected: {}", msg),
            Self::TlsError(msg) => write!(f, "TLS error: {}", msg),
            Self::InvalidReference(msg) => write!(f, "Invalid session reference: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for NetError {}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
