//! Hybridization combiners
//!
//! Each combiner merges an ordered sequence of byte strings into a single
//! derived key. XOR is commutative; HMAC and XORHMAC are order-sensitive, so
//! callers must agree on the sequence order with their peer before combining.

use crate::error::{CryptoError, Result};
use crate::format::enforce_key_size;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Byte-wise XOR of all keys, each first shaped to exactly `chunk_size` bytes.
pub fn xor_keys(keys: &[Vec<u8>], chunk_size: usize) -> Result<Vec<u8>> {
    if keys.is_empty() {
        return Err(CryptoError::EmptyInput);
    }
    if chunk_size == 0 {
        return Err(CryptoError::InvalidChunkSize(chunk_size));
    }

    let mut derived = enforce_key_size(&keys[0], chunk_size);
    for key in &keys[1..] {
        let shaped = enforce_key_size(key, chunk_size);
        for (d, s) in derived.iter_mut().zip(shaped.iter()) {
            *d ^= s;
        }
    }

    Ok(derived)
}

/// HMAC-SHA-256 with `keys[0]` as the MAC key and the concatenation of the
/// remaining keys as the message. Inputs are used as-is; the output is always
/// 32 bytes.
pub fn hmac_keys(keys: &[Vec<u8>]) -> Result<Vec<u8>> {
    if keys.is_empty() {
        return Err(CryptoError::EmptyInput);
    }

    let mut mac = HmacSha256::new_from_slice(&keys[0])
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    for key in &keys[1..] {
        mac.update(key);
    }

    Ok(mac.finalize().into_bytes().to_vec())
}

/// HMAC over the sequence and over the reversed sequence, XORed together at
/// `chunk_size`.
pub fn xor_hmac_keys(keys: &[Vec<u8>], chunk_size: usize) -> Result<Vec<u8>> {
    if chunk_size == 0 {
        return Err(CryptoError::InvalidChunkSize(chunk_size));
    }

    let forward = hmac_keys(keys)?;

    let mut reversed = keys.to_vec();
    reversed.reverse();
    let backward = hmac_keys(&reversed)?;

    xor_keys(&[forward, backward], chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_two_keys() {
        // 0x0102 ^ 0xFF00 = 0xFE02
        let keys = vec![vec![0x01, 0x02], vec![0xFF, 0x00]];
        assert_eq!(xor_keys(&keys, 2).unwrap(), vec![0xFE, 0x02]);
    }

    #[test]
    fn xor_pads_inputs_to_chunk_size() {
        let keys = vec![vec![0x01, 0x02], vec![0xFF, 0x00]];
        assert_eq!(xor_keys(&keys, 4).unwrap(), vec![0xFE, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn xor_output_length_matches_chunk_size() {
        let keys = vec![vec![0xAA; 64], vec![0x55; 16], vec![0x0F; 7]];
        for size in [1usize, 8, 32, 100] {
            assert_eq!(xor_keys(&keys, size).unwrap().len(), size);
        }
    }

    #[test]
    fn xor_is_commutative() {
        let keys = vec![vec![1, 2, 3], vec![4, 5], vec![6]];
        let mut permuted = keys.clone();
        permuted.rotate_left(1);
        assert_eq!(
            xor_keys(&keys, 8).unwrap(),
            xor_keys(&permuted, 8).unwrap()
        );
    }

    #[test]
    fn hmac_matches_known_answer() {
        // HMAC-SHA-256(key="key", msg="msg1msg2")
        let keys = vec![b"key".to_vec(), b"msg1".to_vec(), b"msg2".to_vec()];
        let derived = hmac_keys(&keys).unwrap();
        assert_eq!(derived.len(), 32);

        let direct = {
            let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
            mac.update(b"msg1msg2");
            mac.finalize().into_bytes().to_vec()
        };
        assert_eq!(derived, direct);
    }

    #[test]
    fn hmac_is_order_sensitive() {
        let keys = vec![b"key".to_vec(), b"msg1".to_vec(), b"msg2".to_vec()];
        let mut reversed = keys.clone();
        reversed.reverse();
        assert_ne!(hmac_keys(&keys).unwrap(), hmac_keys(&reversed).unwrap());
    }

    #[test]
    fn xorhmac_output_length_matches_chunk_size() {
        let keys = vec![vec![1, 2, 3], vec![4, 5, 6]];
        for size in [2usize, 32, 64] {
            assert_eq!(xor_hmac_keys(&keys, size).unwrap().len(), size);
        }
    }

    #[test]
    fn xorhmac_preserves_input_order() {
        let keys = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let snapshot = keys.clone();
        xor_hmac_keys(&keys, 32).unwrap();
        assert_eq!(keys, snapshot);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(xor_keys(&[], 16), Err(CryptoError::EmptyInput));
        assert_eq!(hmac_keys(&[]), Err(CryptoError::EmptyInput));
        assert_eq!(xor_hmac_keys(&[], 16), Err(CryptoError::EmptyInput));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let keys = vec![vec![1u8]];
        assert_eq!(xor_keys(&keys, 0), Err(CryptoError::InvalidChunkSize(0)));
        assert_eq!(
            xor_hmac_keys(&keys, 0),
            Err(CryptoError::InvalidChunkSize(0))
        );
    }
}
