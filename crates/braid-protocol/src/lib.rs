//! # Braid Session Protocol
//!
//! The ETSI-004-style core of the hybrid key-derivation daemon: the request
//! model the local agent speaks, the uniform key-source contract with its QKD
//! and post-quantum implementations, and the session engine that coordinates
//! the two daemons and hybridizes the per-source secrets.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod format;
pub mod model;
pub mod session;
pub mod source;

pub use error::{ProtocolError, QkdError, Result};
pub use session::Session;
pub use source::KeySource;
