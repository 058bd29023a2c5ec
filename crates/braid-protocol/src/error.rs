//! Protocol error types

use braid_crypto::CryptoError;
use braid_net::NetError;
use std::fmt;

/// Result type alias using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors reported by the upstream QKD key-management service, mirroring its
/// response status table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QkdError {
    /// Status 1: connection succeeded but the peer is not connected
    PeerNotConnected,
    /// Status 2: not enough key material available
    InsufficientKey,
    /// Status 3: the peer application is not connected
    PeerApplicationNotConnected,
    /// Status 4: no QKD connection is available
    NoQkdConnection,
    /// Status 5: the KSID is already in use
    KsidInUse,
    /// Status 6: the call hit the specified timeout
    Timeout,
    /// Status 7: the requested QoS settings could not be met
    QosSettings,
    /// Status 8: the metadata buffer size is insufficient
    MetadataSize,
    /// Any other non-zero status
    Unknown(i64),
    /// The KMS could not be reached
    Connection(String),
    /// The KMS answered with something unusable
    Protocol(String),
}

impl QkdError {
    /// Map a KMS response status to an error; `0` is success
    pub fn check_status(status: i64) -> std::result::Result<(), QkdError> {
        match status {
            0 => Ok(()),
            1 => Err(Self::PeerNotConnected),
            2 => Err(Self::InsufficientKey),
            3 => Err(Self::PeerApplicationNotConnected),
            4 => Err(Self::NoQkdConnection),
            5 => Err(Self::KsidInUse),
            6 => Err(Self::Timeout),
            7 => Err(Self::QosSettings),
            8 => Err(Self::MetadataSize),
            other => Err(Self::Unknown(other)),
        }
    }
}

impl fmt::Display for QkdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerNotConnected => write!(f, "Connection successful, but peer is not connected"),
            Self::InsufficientKey => write!(f, "GET_KEY failed due to insufficient key availability"),
            Self::PeerApplicationNotConnected => {
                write!(f, "GET_KEY failed because peer application is not connected")
            }
            Self::NoQkdConnection => write!(f, "No QKD connection is available"),
            Self::KsidInUse => write!(f, "OPEN_CONNECT failed because the KSID is already in use"),
            Self::Timeout => write!(f, "The call failed due to the specified TIMEOUT"),
            Self::QosSettings => {
                write!(f, "OPEN failed because requested QoS settings could not be met")
            }
            Self::MetadataSize => {
                write!(f, "GET_KEY failed because the metadata buffer size is insufficient")
            }
            Self::Unknown(status) => write!(f, "Unknown QKD error with status code {}", status),
            Self::Connection(msg) => write!(f, "Unable to reach the KMS node: {}", msg),
            Self::Protocol(msg) => write!(f, "Unusable KMS response: {}", msg),
        }
    }
}

impl std::error::Error for QkdError {}

/// Session-layer errors
#[derive(Debug)]
pub enum ProtocolError {
    /// The request URIs name neither this node nor a role for it
    UuidMismatch {
        /// Source uuid from the request URI
        source: String,
        /// Destination uuid from the request URI
        destination: String,
        /// This node's uuid
        local: String,
    },
    /// The partner daemon is not in the trusted-peers registry
    UnknownPeer(String),
    /// A request field could not be interpreted
    InvalidRequest(String),
    /// Key material arrived in a shape `key_to_bytes` cannot decode
    UnsupportedKeyType(String),
    /// The QoS chunk size cannot produce a key
    InvalidChunkSize(i64),
    /// QKD source failure
    Qkd(QkdError),
    /// PQC source failure (handshake I/O or KEM)
    Pqc(String),
    /// Cryptographic primitive failure
    Crypto(CryptoError),
    /// Peer-channel failure
    Net(NetError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UuidMismatch {
                source,
                destination,
                local,
            } => write!(
                f,
                "Neither {} nor {} match the local uuid {}",
                source, destination, local
            ),
            Self::UnknownPeer(uuid) => {
                write!(f, "The hybridization module with uuid {} is not registered", uuid)
            }
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::UnsupportedKeyType(msg) => write!(f, "Unsupported key type: {}", msg),
            Self::InvalidChunkSize(size) => write!(f, "Invalid key chunk size: {}", size),
            Self::Qkd(err) => write!(f, "QKD error: {}", err),
            Self::Pqc(msg) => write!(f, "PQC error: {}", msg),
            Self::Crypto(err) => write!(f, "Crypto error: {}", err),
            Self::Net(err) => write!(f, "Network error: {}", err),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<QkdError> for ProtocolError {
    fn from(err: QkdError) -> Self {
        Self::Qkd(err)
    }
}

impl From<CryptoError> for ProtocolError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl From<NetError> for ProtocolError {
    fn from(err: NetError) -> Self {
        Self::Net(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_zero_is_success() {
        assert!(QkdError::check_status(0).is_ok());
    }

    #[test]
    fn mapped_statuses_yield_their_kind() {
        assert_eq!(QkdError::check_status(1), Err(QkdError::PeerNotConnected));
        assert_eq!(QkdError::check_status(2), Err(QkdError::InsufficientKey));
        assert_eq!(
            QkdError::check_status(3),
            Err(QkdError::PeerApplicationNotConnected)
        );
        assert_eq!(QkdError::check_status(4), Err(QkdError::NoQkdConnection));
        assert_eq!(QkdError::check_status(5), Err(QkdError::KsidInUse));
        assert_eq!(QkdError::check_status(6), Err(QkdError::Timeout));
        assert_eq!(QkdError::check_status(7), Err(QkdError::QosSettings));
        assert_eq!(QkdError::check_status(8), Err(QkdError::MetadataSize));
    }

    #[test]
    fn unmapped_statuses_are_unknown() {
        assert_eq!(QkdError::check_status(42), Err(QkdError::Unknown(42)));
        assert_eq!(QkdError::check_status(-1), Err(QkdError::Unknown(-1)));
    }
}
