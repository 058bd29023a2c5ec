//! Key sources
//!
//! A key source is anything that can be opened for a hybrid key stream and
//! then produce one secret per `get` call. The session drives every source of
//! a stream in parallel and treats a failing source as absent for that
//! operation -- the remaining sources carry on.

pub mod pqc;
pub mod qkd;

use crate::error::Result;
use crate::model::{KeyType, OpenConnectQos};
use async_trait::async_trait;

pub use pqc::PqcSource;
pub use qkd::{MockQkdStack, QkdSource};

/// Uniform `open / get / close` contract over the source variants
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Stable identifier, used as the map key within a session
    fn id(&self) -> &str;

    /// Which family this source belongs to
    fn key_type(&self) -> KeyType;

    /// Prepare the source so `get` can run; may perform I/O
    async fn open(&mut self, hybrid_ksid: &str, qos: &OpenConnectQos) -> Result<()>;

    /// Produce one secret; one successful `get` backs one hybrid key
    async fn get(&mut self) -> Result<Vec<u8>>;

    /// Release resources; idempotent, logs and swallows errors
    async fn close(&mut self);
}
