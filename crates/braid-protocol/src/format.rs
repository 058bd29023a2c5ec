//! Decoding key material out of JSON responses
//!
//! Upstream services are loose about how they ship key bytes: integer lists,
//! base64 strings, hex strings, occasionally bare integers. Everything funnels
//! through [`key_to_bytes`] before touching a combiner.

use crate::error::{ProtocolError, Result};
use base64::Engine;
use serde_json::Value;

pub use braid_crypto::format::enforce_key_size;

/// Decode one JSON value into raw key bytes.
///
/// Strings are tried as base64, then hex, then taken as UTF-8. Integers become
/// their minimum-width big-endian encoding (`0` is a single zero byte). Arrays
/// must contain integers in `0..=255` and are packed verbatim.
pub fn key_to_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => {
            if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(s) {
                return Ok(decoded);
            }
            if let Ok(decoded) = hex::decode(s) {
                return Ok(decoded);
            }
            Ok(s.as_bytes().to_vec())
        }
        Value::Number(n) => {
            let v = n.as_u64().ok_or_else(|| {
                ProtocolError::UnsupportedKeyType(format!("non-natural number {}", n))
            })?;
            if v == 0 {
                return Ok(vec![0]);
            }
            let be = v.to_be_bytes();
            let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
            Ok(be[first..].to_vec())
        }
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or_else(|| {
                        ProtocolError::UnsupportedKeyType(format!(
                            "list element {} is not a byte",
                            item
                        ))
                    })
            })
            .collect(),
        other => Err(ProtocolError::UnsupportedKeyType(format!(
            "expected string, integer, or integer list, got {}",
            other
        ))),
    }
}
