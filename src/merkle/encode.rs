//! Canonical record encoding.
//!
//! Every record that gets hashed or persisted (buckets, digest tables,
//! headers, transactions, receipts, tx metas) is serialized with this
//! encoding: byte strings are `u32` big-endian length followed by the
//! bytes, integers are fixed-width big-endian, digests and addresses are
//! raw fixed-width bytes. The encoding is normative - changing it changes
//! every root.

use primitive_types::{H160, H256, U256};
use thiserror::Error;

/// Decoding errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of record")]
    UnexpectedEof,
    #[error("trailing bytes after record")]
    TrailingBytes,
    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}

/// Result type for decoding.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Buffer-building encoder for canonical records.
#[derive(Clone, Debug, Default)]
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    /// Creates a new empty encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an encoder with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a length-prefixed byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a fixed-width big-endian u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a fixed-width big-endian u64.
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a digest as raw 32 bytes.
    pub fn write_digest(&mut self, digest: &H256) {
        self.buffer.extend_from_slice(digest.as_bytes());
    }

    /// Writes an address as raw 20 bytes.
    pub fn write_address(&mut self, address: &H160) {
        self.buffer.extend_from_slice(address.as_bytes());
    }

    /// Writes a 256-bit integer as 32 big-endian bytes.
    pub fn write_u256(&mut self, value: &U256) {
        self.buffer.extend_from_slice(&value.to_big_endian());
    }
}

/// Cursor-based decoder over a canonical record.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads a length-prefixed byte string.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a fixed-width big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().map_err(|_| CodecError::UnexpectedEof)?))
    }

    /// Reads a fixed-width big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().map_err(|_| CodecError::UnexpectedEof)?))
    }

    /// Reads a raw 32-byte digest.
    pub fn read_digest(&mut self) -> Result<H256> {
        Ok(H256::from_slice(self.take(32)?))
    }

    /// Reads a raw 20-byte address.
    pub fn read_address(&mut self) -> Result<H160> {
        Ok(H160::from_slice(self.take(20)?))
    }

    /// Reads a 256-bit integer from 32 big-endian bytes.
    pub fn read_u256(&mut self) -> Result<U256> {
        Ok(U256::from_big_endian(self.take(32)?))
    }

    /// Returns true if the whole record has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Fails unless the whole record has been consumed.
    pub fn finish(self) -> Result<()> {
        if self.is_exhausted() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes)
        }
    }
}
