//! Protocol enumerations

use crate::error::ProtocolError;
use braid_crypto::KemAlgorithm;
use std::fmt;
use std::str::FromStr;

/// How per-source secrets are combined into the hybrid key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridizationMethod {
    /// Byte-wise XOR at the QoS chunk size
    Xor,
    /// HMAC-SHA-256 keyed by the first secret
    Hmac,
    /// Forward and reverse HMAC, XORed together
    XorHmac,
}

impl HybridizationMethod {
    /// Canonical query-parameter spelling
    pub fn name(&self) -> &'static str {
        match self {
            Self::Xor => "xoring",
            Self::Hmac => "hmac",
            Self::XorHmac => "xorhmac",
        }
    }
}

impl fmt::Display for HybridizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HybridizationMethod {
    type Err = ProtocolError;

    /// Case-insensitive lookup by canonical name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Xor, Self::Hmac, Self::XorHmac]
            .into_iter()
            .find(|method| method.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                ProtocolError::InvalidRequest(format!("unknown hybridization method {:?}", s))
            })
    }
}

/// Family a key source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Quantum key distribution, via the upstream KMS
    Qkd,
    /// Post-quantum KEM over the peer channel
    Pqc,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qkd => f.write_str("QKD"),
            Self::Pqc => f.write_str("PQC"),
        }
    }
}

/// One entry of the `key_sources=` request parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExtractionAlgorithm {
    /// The special value `QKD`
    Qkd,
    /// A post-quantum KEM by name
    Kem(KemAlgorithm),
}

impl KeyExtractionAlgorithm {
    /// Which source family this algorithm instantiates
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Qkd => KeyType::Qkd,
            Self::Kem(_) => KeyType::Pqc,
        }
    }
}

impl fmt::Display for KeyExtractionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qkd => f.write_str("QKD"),
            Self::Kem(alg) => f.write_str(alg.name()),
        }
    }
}

impl FromStr for KeyExtractionAlgorithm {
    type Err = ProtocolError;

    /// Case-insensitive: `QKD` or any catalogue KEM name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("QKD") {
            return Ok(Self::Qkd);
        }
        s.parse::<KemAlgorithm>()
            .map(Self::Kem)
            .map_err(ProtocolError::Crypto)
    }
}
