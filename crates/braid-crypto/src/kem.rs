//! Uniform wrapper over the liboqs key-encapsulation mechanisms
//!
//! The daemon negotiates KEM transcripts over pre-established secure channels
//! and needs byte-exact knowledge of public-key and ciphertext lengths for
//! framing. This module exposes the algorithm catalogue plus a thin `Kem`
//! handle offering keypair generation, encapsulation, and decapsulation.

use crate::error::{CryptoError, Result};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

macro_rules! kem_algorithms {
    ($(($variant:ident, $name:literal, $oqs:ident)),* $(,)?) => {
        /// KEM algorithm catalogue, mirroring the liboqs identifiers
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum KemAlgorithm {
            $(
                #[doc = $name]
                $variant,
            )*
        }

        impl KemAlgorithm {
            /// Every supported algorithm, in catalogue order
            pub const ALL: &'static [KemAlgorithm] = &[$(KemAlgorithm::$variant),*];

            /// Canonical algorithm name (the liboqs spelling)
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name),*
                }
            }

            fn oqs_algorithm(&self) -> oqs::kem::Algorithm {
                match self {
                    $(Self::$variant => oqs::kem::Algorithm::$oqs),*
                }
            }
        }
    };
}

kem_algorithms! {
    (BikeL1, "BIKE-L1", BikeL1),
    (BikeL3, "BIKE-L3", BikeL3),
    (BikeL5, "BIKE-L5", BikeL5),
    (ClassicMcEliece348864, "Classic-McEliece-348864", ClassicMcEliece348864),
    (ClassicMcEliece348864f, "Classic-McEliece-348864f", ClassicMcEliece348864f),
    (ClassicMcEliece460896, "Classic-McEliece-460896", ClassicMcEliece460896),
    (ClassicMcEliece460896f, "Classic-McEliece-460896f", ClassicMcEliece460896f),
    (ClassicMcEliece6688128, "Classic-McEliece-6688128", ClassicMcEliece6688128),
    (ClassicMcEliece6688128f, "Classic-McEliece-6688128f", ClassicMcEliece6688128f),
    (ClassicMcEliece6960119, "Classic-McEliece-6960119", ClassicMcEliece6960119),
    (ClassicMcEliece6960119f, "Classic-McEliece-6960119f", ClassicMcEliece6960119f),
    (ClassicMcEliece8192128, "Classic-McEliece-8192128", ClassicMcEliece8192128),
    (ClassicMcEliece8192128f, "Classic-McEliece-8192128f", ClassicMcEliece8192128f),
    (FrodoKem640Aes, "FrodoKEM-640-AES", FrodoKem640Aes),
    (FrodoKem640Shake, "FrodoKEM-640-SHAKE", FrodoKem640Shake),
    (FrodoKem976Aes, "FrodoKEM-976-AES", FrodoKem976Aes),
    (FrodoKem976Shake, "FrodoKEM-976-SHAKE", FrodoKem976Shake),
    (FrodoKem1344Aes, "FrodoKEM-1344-AES", FrodoKem1344Aes),
    (FrodoKem1344Shake, "FrodoKEM-1344-SHAKE", FrodoKem1344Shake),
    (Hqc128, "HQC-128", Hqc128),
    (Hqc192, "HQC-192", Hqc192),
    (Hqc256, "HQC-256", Hqc256),
    (Kyber512, "Kyber512", Kyber512),
    (Kyber768, "Kyber768", Kyber768),
    (Kyber1024, "Kyber1024", Kyber1024),
    (MlKem512, "ML-KEM-512", MlKem512),
    (MlKem768, "ML-KEM-768", MlKem768),
    (MlKem1024, "ML-KEM-1024", MlKem1024),
    (Sntrup761, "sntrup761", NtruPrimeSntrup761),
}

impl fmt::Display for KemAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KemAlgorithm {
    type Err = CryptoError;

    /// Case-insensitive lookup by canonical name
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| CryptoError::UnknownAlgorithm(s.to_string()))
    }
}

/// KEM secret key, kept opaque between keypair generation and decapsulation
pub struct KemSecretKey(oqs::kem::SecretKey);

/// One key-encapsulation mechanism instance
pub struct Kem {
    algorithm: KemAlgorithm,
    inner: oqs::kem::Kem,
}

impl Kem {
    /// Instantiate the mechanism for `algorithm`
    pub fn new(algorithm: KemAlgorithm) -> Result<Self> {
        oqs::init();
        let inner = oqs::kem::Kem::new(algorithm.oqs_algorithm())?;
        Ok(Self { algorithm, inner })
    }

    /// The algorithm this instance runs
    pub fn algorithm(&self) -> KemAlgorithm {
        self.algorithm
    }

    /// Exact public-key length on the wire
    pub fn public_key_len(&self) -> usize {
        self.inner.length_public_key()
    }

    /// Exact ciphertext length on the wire
    pub fn ciphertext_len(&self) -> usize {
        self.inner.length_ciphertext()
    }

    /// Length of the shared secret both sides derive
    pub fn shared_secret_len(&self) -> usize {
        self.inner.length_shared_secret()
    }

    /// Generate a fresh `(public_key, secret_key)` pair
    pub fn keypair(&self) -> Result<(Vec<u8>, KemSecretKey)> {
        let (pk, sk) = self.inner.keypair()?;
        Ok((pk.into_vec(), KemSecretKey(sk)))
    }

    /// Encapsulate to a peer public key, yielding `(ciphertext, shared_secret)`
    pub fn encapsulate(&self, public_key: &[u8]) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>)> {
        let pk = self
            .inner
            .public_key_from_bytes(public_key)
            .ok_or_else(|| {
                CryptoError::InvalidKey(format!(
                    "{} public key must be {} bytes, got {}",
                    self.algorithm,
                    self.public_key_len(),
                    public_key.len()
                ))
            })?;

        let (ct, ss) = self.inner.encapsulate(pk)?;
        Ok((ct.into_vec(), Zeroizing::new(ss.into_vec())))
    }

    /// Recover the shared secret from a ciphertext
    pub fn decapsulate(
        &self,
        secret_key: &KemSecretKey,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let ct = self
            .inner
            .ciphertext_from_bytes(ciphertext)
            .ok_or_else(|| {
                CryptoError::InvalidKey(format!(
                    "{} ciphertext must be {} bytes, got {}",
                    self.algorithm,
                    self.ciphertext_len(),
                    ciphertext.len()
                ))
            })?;

        let ss = self.inner.decapsulate(&secret_key.0, ct)?;
        Ok(Zeroizing::new(ss.into_vec()))
    }
}

impl fmt::Debug for Kem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kem")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "kyber512".parse::<KemAlgorithm>().unwrap(),
            KemAlgorithm::Kyber512
        );
        assert_eq!(
            "ml-kem-768".parse::<KemAlgorithm>().unwrap(),
            KemAlgorithm::MlKem768
        );
        assert_eq!(
            "SNTRUP761".parse::<KemAlgorithm>().unwrap(),
            KemAlgorithm::Sntrup761
        );
    }

    #[test]
    fn parse_display_roundtrip() {
        for alg in KemAlgorithm::ALL {
            assert_eq!(alg.name().parse::<KemAlgorithm>().unwrap(), *alg);
        }
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(matches!(
            "RSA-2048".parse::<KemAlgorithm>(),
            Err(CryptoError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn kyber_roundtrip_agrees() {
        let kem = Kem::new(KemAlgorithm::Kyber512).unwrap();
        let (pk, sk) = kem.keypair().unwrap();
        assert_eq!(pk.len(), kem.public_key_len());

        let (ct, server_secret) = kem.encapsulate(&pk).unwrap();
        assert_eq!(ct.len(), kem.ciphertext_len());

        let client_secret = kem.decapsulate(&sk, &ct).unwrap();
        assert_eq!(*server_secret, *client_secret);
        assert_eq!(client_secret.len(), kem.shared_secret_len());
    }

    #[test]
    fn mlkem_roundtrip_agrees() {
        let kem = Kem::new(KemAlgorithm::MlKem768).unwrap();
        let (pk, sk) = kem.keypair().unwrap();
        let (ct, server_secret) = kem.encapsulate(&pk).unwrap();
        let client_secret = kem.decapsulate(&sk, &ct).unwrap();
        assert_eq!(*server_secret, *client_secret);
    }

    #[test]
    fn truncated_public_key_is_rejected() {
        let kem = Kem::new(KemAlgorithm::Kyber512).unwrap();
        let (pk, _sk) = kem.keypair().unwrap();
        assert!(kem.encapsulate(&pk[..pk.len() - 1]).is_err());
    }
}
