//! Bucket: the unit of hashing in the state tree.
//!
//! A bucket owns a key-sorted sequence of live entries. Its canonical
//! serialization concatenates length-prefixed key then value for each
//! entry in key-ascending byte order, so the digest is independent of
//! insertion order. An empty bucket has the nil digest and no record in
//! the store.

use primitive_types::H256;

use super::digest::{sha256, NIL_DIGEST};
use super::encode::{CodecError, Decoder, Encoder};

/// A key-sorted container of live `(key, value)` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bucket {
    /// Entries sorted by key bytes, unique keys.
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Bucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bucket holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|idx| self.entries[idx].1.as_slice())
    }

    /// Inserts or overwrites an entry, keeping the sort order.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.entries.binary_search_by(|(k, _)| k.as_slice().cmp(&key[..])) {
            Ok(idx) => self.entries[idx].1 = value,
            Err(idx) => self.entries.insert(idx, (key, value)),
        }
    }

    /// Removes the entry under `key`, returning its value if present.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|idx| self.entries.remove(idx).1)
    }

    /// Returns the entries in key-ascending order.
    pub fn entries(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.entries
    }

    /// Canonical serialization: length-prefixed key then value per entry,
    /// key-ascending.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(self.entries.len() * 16);
        for (key, value) in &self.entries {
            enc.write_bytes(key);
            enc.write_bytes(value);
        }
        enc.into_bytes()
    }

    /// Decodes a bucket record, verifying sort order and key uniqueness.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let mut entries = Vec::new();
        while !dec.is_exhausted() {
            let key = dec.read_bytes()?;
            let value = dec.read_bytes()?;
            if let Some((prev, _)) = entries.last() {
                if *prev >= key {
                    return Err(CodecError::InvalidField("bucket entries out of order"));
                }
            }
            entries.push((key, value));
        }
        Ok(Self { entries })
    }

    /// Digest of the canonical serialization; nil for an empty bucket.
    pub fn hash(&self) -> H256 {
        if self.entries.is_empty() {
            return NIL_DIGEST;
        }
        sha256(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bucket_hash_is_nil() {
        assert_eq!(Bucket::new().hash(), NIL_DIGEST);
    }

    #[test]
    fn test_insert_get_remove() {
        let mut bucket = Bucket::new();
        bucket.insert(b"k1".to_vec(), b"v1".to_vec());
        assert_eq!(bucket.get(b"k1"), Some(&b"v1"[..]));

        bucket.insert(b"k1".to_vec(), b"v2".to_vec());
        assert_eq!(bucket.get(b"k1"), Some(&b"v2"[..]));
        assert_eq!(bucket.len(), 1);

        assert_eq!(bucket.remove(b"k1"), Some(b"v2".to_vec()));
        assert!(bucket.is_empty());
        assert_eq!(bucket.remove(b"k1"), None);
    }

    #[test]
    fn test_hash_independent_of_insertion_order() {
        let mut a = Bucket::new();
        a.insert(b"x".to_vec(), b"1".to_vec());
        a.insert(b"y".to_vec(), b"2".to_vec());
        a.insert(b"z".to_vec(), b"3".to_vec());

        let mut b = Bucket::new();
        b.insert(b"z".to_vec(), b"3".to_vec());
        b.insert(b"x".to_vec(), b"1".to_vec());
        b.insert(b"y".to_vec(), b"2".to_vec());

        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut bucket = Bucket::new();
        bucket.insert(b"abcd".to_vec(), b"test2asd".to_vec());
        bucket.insert(b"asdf".to_vec(), b"asdfff".to_vec());

        let decoded = Bucket::decode(&bucket.encode()).unwrap();
        assert_eq!(decoded, bucket);
    }

    #[test]
    fn test_decode_rejects_unsorted() {
        let mut enc = Encoder::new();
        enc.write_bytes(b"b");
        enc.write_bytes(b"1");
        enc.write_bytes(b"a");
        enc.write_bytes(b"2");

        assert!(Bucket::decode(enc.as_bytes()).is_err());
    }

    #[test]
    fn test_value_change_moves_hash() {
        let mut bucket = Bucket::new();
        bucket.insert(b"k".to_vec(), b"v1".to_vec());
        let h1 = bucket.hash();

        bucket.insert(b"k".to_vec(), b"v2".to_vec());
        assert_ne!(bucket.hash(), h1);
    }
}
