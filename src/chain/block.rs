//! Block, transaction, and receipt records.
//!
//! All records are immutable after construction and carry their digest,
//! computed once from the canonical serialization. The block digest is the
//! header digest: transactions are authenticated through the state root,
//! not mixed into the block hash. Total difficulty rides along as chain
//! metadata and is excluded from the header digest.

use primitive_types::{H160, H256, U256};

use crate::merkle::{sha256, CodecError, Decoder, Encoder};

/// 64-bit mining nonce proving work was done on a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockNonce(pub [u8; 8]);

impl BlockNonce {
    /// Builds a nonce from a u64.
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    /// Returns the nonce as a u64.
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

/// Block header. Digest = SHA-256 of the canonical serialization of the
/// fields in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Hash of the parent block.
    pub parent_hash: H256,
    /// Block height.
    pub height: u64,
    /// Mining difficulty of this block.
    pub difficulty: U256,
    /// State root after executing this block.
    pub state_root: H256,
    /// Address receiving the block reward.
    pub miner: H160,
    /// Arbitrary extra bytes.
    pub extra: Vec<u8>,
    /// Mining nonce.
    pub nonce: BlockNonce,
    /// Unix timestamp, seconds.
    pub timestamp: u64,
}

impl Header {
    /// Canonical serialization, normative for the header digest.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(128 + self.extra.len());
        enc.write_digest(&self.parent_hash);
        enc.write_u64(self.height);
        enc.write_u256(&self.difficulty);
        enc.write_digest(&self.state_root);
        enc.write_address(&self.miner);
        enc.write_bytes(&self.extra);
        enc.write_bytes(&self.nonce.0);
        enc.write_u64(self.timestamp);
        enc.into_bytes()
    }

    /// Decodes a header; inverse of [`Header::encode`].
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let header = Self::read_from(&mut dec)?;
        dec.finish()?;
        Ok(header)
    }

    fn read_from(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let parent_hash = dec.read_digest()?;
        let height = dec.read_u64()?;
        let difficulty = dec.read_u256()?;
        let state_root = dec.read_digest()?;
        let miner = dec.read_address()?;
        let extra = dec.read_bytes()?;
        let nonce_bytes = dec.read_bytes()?;
        let nonce = BlockNonce(
            nonce_bytes
                .as_slice()
                .try_into()
                .map_err(|_| CodecError::InvalidField("nonce length"))?,
        );
        let timestamp = dec.read_u64()?;
        Ok(Self {
            parent_hash,
            height,
            difficulty,
            state_root,
            miner,
            extra,
            nonce,
            timestamp,
        })
    }

    /// Digest of the canonical serialization.
    pub fn hash(&self) -> H256 {
        sha256(&self.encode())
    }
}

/// A transfer record as this engine sees it; execution semantics live in
/// the VM layer. The digest is computed at construction; the record is
/// immutable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Sender nonce.
    pub nonce: u64,
    /// Sender address.
    pub from: H160,
    /// Recipient address.
    pub to: H160,
    /// Transferred value.
    pub value: U256,
    /// Call payload.
    pub payload: Vec<u8>,
    hash: H256,
}

impl Transaction {
    /// Creates a transaction and computes its digest.
    pub fn new(nonce: u64, from: H160, to: H160, value: U256, payload: Vec<u8>) -> Self {
        let mut tx = Self {
            nonce,
            from,
            to,
            value,
            payload,
            hash: H256::zero(),
        };
        tx.hash = sha256(&tx.encode());
        tx
    }

    /// Returns the transaction digest.
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Canonical serialization.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(100 + self.payload.len());
        enc.write_u64(self.nonce);
        enc.write_address(&self.from);
        enc.write_address(&self.to);
        enc.write_u256(&self.value);
        enc.write_bytes(&self.payload);
        enc.into_bytes()
    }

    /// Decodes a transaction, recomputing its digest.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let nonce = dec.read_u64()?;
        let from = dec.read_address()?;
        let to = dec.read_address()?;
        let value = dec.read_u256()?;
        let payload = dec.read_bytes()?;
        dec.finish()?;
        Ok(Self::new(nonce, from, to, value, payload))
    }
}

/// Execution receipt for a single transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Digest of the transaction this receipt belongs to.
    pub tx_hash: H256,
    /// Whether execution succeeded.
    pub status: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Return data.
    pub output: Vec<u8>,
}

impl Receipt {
    /// Canonical serialization.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(48 + self.output.len());
        enc.write_digest(&self.tx_hash);
        enc.write_u8(self.status as u8);
        enc.write_u64(self.gas_used);
        enc.write_bytes(&self.output);
        enc.into_bytes()
    }

    /// Decodes a receipt; inverse of [`Receipt::encode`].
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let tx_hash = dec.read_digest()?;
        let status = match dec.read_u8()? {
            0 => false,
            1 => true,
            _ => return Err(CodecError::InvalidField("receipt status")),
        };
        let gas_used = dec.read_u64()?;
        let output = dec.read_bytes()?;
        dec.finish()?;
        Ok(Self {
            tx_hash,
            status,
            gas_used,
            output,
        })
    }
}

/// A block: header, transactions, and total-difficulty metadata.
///
/// The hash is the header hash, computed at construction. Blocks are
/// immutable; the commit pipeline shares them behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
    /// Cumulative chain difficulty up to and including this block.
    /// Metadata only: excluded from the header digest.
    td: U256,
    hash: H256,
}

impl Block {
    /// Creates a block and computes its hash from the header.
    pub fn new(header: Header, transactions: Vec<Transaction>, td: U256) -> Self {
        let hash = header.hash();
        Self {
            header,
            transactions,
            td,
            hash,
        }
    }

    /// Returns the block hash (= header hash).
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// Returns the block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Returns the header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the transactions.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Returns the total difficulty metadata.
    pub fn td(&self) -> U256 {
        self.td
    }

    /// Canonical serialization: header, transactions, total difficulty.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_bytes(&self.header.encode());
        enc.write_u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            enc.write_bytes(&tx.encode());
        }
        enc.write_u256(&self.td);
        enc.into_bytes()
    }

    /// Decodes a block, recomputing the header hash.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let header = Header::decode(&dec.read_bytes()?)?;
        let count = dec.read_u32()? as usize;
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(Transaction::decode(&dec.read_bytes()?)?);
        }
        let td = dec.read_u256()?;
        dec.finish()?;
        Ok(Self::new(header, transactions, td))
    }
}
