//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias using CryptoError
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A combiner was called with no input keys
    #[error("Hybridization requires at least one input key")]
    EmptyInput,

    /// The requested chunk size cannot produce a key
    #[error("Invalid key chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Invalid key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Unknown KEM algorithm name
    #[error("Unknown KEM algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Error raised by the underlying KEM library
    #[error("KEM operation failed: {0}")]
    Kem(String),
}

impl From<oqs::Error> for CryptoError {
    fn from(e: oqs::Error) -> Self {
        CryptoError::Kem(e.to_string())
    }
}
