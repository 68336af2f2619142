//! Storage-key hashing primitives.
//!
//! Substrate storage maps address entries with pallet-prefix hashing
//! (twox-128 of the pallet and item names) plus a per-key hasher
//! (blake2-128-concat for `System.Account`).

use blake2::digest::consts::{U16, U32};
use blake2::{Blake2b, Digest};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// twox-128: two xxhash64 passes (seeds 0 and 1), little-endian concat.
pub fn twox_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for seed in 0..2u64 {
        let mut hasher = XxHash64::with_seed(seed);
        hasher.write(data);
        out[(seed as usize) * 8..(seed as usize) * 8 + 8]
            .copy_from_slice(&hasher.finish().to_le_bytes());
    }
    out
}

pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    let mut hasher = Blake2b::<U16>::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// blake2-128-concat: hash followed by the raw key, so the key remains
/// recoverable from the storage path.
pub fn blake2_128_concat(data: &[u8]) -> Vec<u8> {
    let mut out = blake2_128(data).to_vec();
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twox_128_known_pallet_prefixes() {
        // The System.Account storage prefix is a fixed, well-known constant.
        assert_eq!(hex::encode(twox_128(b"System")), "26aa394eea5630e07c48ae0c9558cef7");
        assert_eq!(hex::encode(twox_128(b"Account")), "b99d880ec681799c0cf30e8886371da9");
    }

    #[test]
    fn test_blake2_256_empty() {
        assert_eq!(
            hex::encode(blake2_256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_blake2_128_concat_carries_key() {
        let key = [7u8; 32];
        let hashed = blake2_128_concat(&key);
        assert_eq!(hashed.len(), 16 + 32);
        assert_eq!(&hashed[16..], &key);
    }
}
