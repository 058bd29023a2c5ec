//! # Braid Cryptography Library
//!
//! This crate provides the cryptographic primitives for the Braid hybrid
//! key-derivation daemon: the combiners that merge per-source secrets into one
//! hybrid key, key shaping helpers, deterministic auxiliary-key expansion, and
//! a uniform wrapper over the liboqs post-quantum KEMs.
//!
//! All combiners are pure functions over ordered byte strings -- callers are
//! responsible for fixing the input order before combining (both peers must
//! feed the combiners bit-identical sequences).

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod format;
pub mod hybridize;
pub mod kem;
pub mod seed;

// Re-export commonly used types
pub use error::{CryptoError, Result};
pub use kem::{Kem, KemAlgorithm};
