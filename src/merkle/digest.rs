//! Content digest and bucket index primitives.

use primitive_types::H256;
use sha2::{Digest, Sha256};

/// Digest size (SHA-256).
pub const DIGEST_SIZE: usize = 32;

/// The nil digest: denotes absence (an empty bucket, a missing child).
///
/// Never a legal digest of non-empty content.
pub const NIL_DIGEST: H256 = H256::zero();

/// Computes the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// FNV-1a 64-bit hash.
///
/// Normative: bucket placement is part of the on-disk format, so this is a
/// pinned constant algorithm rather than a swappable hasher.
pub fn fnv1a64(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Maps a state key to its bucket index: `fnv1a64(key) mod capacity`.
pub fn bucket_index(key: &[u8], capacity: usize) -> usize {
    (fnv1a64(key) % capacity as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            digest.as_bytes()[..4],
            [0xba, 0x78, 0x16, 0xbf],
        );
    }

    #[test]
    fn test_nil_digest_is_zero() {
        assert!(NIL_DIGEST.is_zero());
        assert_ne!(sha256(b""), NIL_DIGEST);
    }

    #[test]
    fn test_fnv1a64_known_vectors() {
        // Reference values for the 64-bit FNV-1a parameters
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_bucket_index_in_range() {
        for key in [&b"abcd"[..], b"asdf", b"lowesyang", b"test1"] {
            assert!(bucket_index(key, 8) < 8);
        }
    }
}
