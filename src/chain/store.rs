//! Indexed, append-only block storage.
//!
//! Blocks are stored by hash with a height-to-hash index; committed
//! transactions get a meta record resolving their hash to the enclosing
//! block, and receipts are stored by transaction hash. Every write is
//! recorded into the height batch - nothing touches the store directly,
//! so a crash before the flush leaves no partial block visible.

use std::sync::Arc;

use primitive_types::H256;
use thiserror::Error;
use tracing::debug;

use crate::merkle::{CodecError, Decoder, Encoder};
use crate::store::{schema, Batch, KvStore, StoreError};

use super::block::{Block, Receipt};

/// Chain storage errors.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("corrupt chain record: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for chain store operations.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Location of a committed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxMeta {
    /// Hash of the enclosing block.
    pub block_hash: H256,
    /// Height of the enclosing block.
    pub height: u64,
    /// Position within the block.
    pub index: u32,
}

impl TxMeta {
    /// Canonical serialization: block hash, height, index.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(44);
        enc.write_digest(&self.block_hash);
        enc.write_u64(self.height);
        enc.write_u32(self.index);
        enc.into_bytes()
    }

    /// Decodes a tx meta record; inverse of [`TxMeta::encode`].
    pub fn decode(data: &[u8]) -> std::result::Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let block_hash = dec.read_digest()?;
        let height = dec.read_u64()?;
        let index = dec.read_u32()?;
        dec.finish()?;
        Ok(Self {
            block_hash,
            height,
            index,
        })
    }
}

/// Append-only indexed store for blocks, tx metas, and receipts.
pub struct ChainStore<S> {
    store: Arc<S>,
}

impl<S: KvStore> ChainStore<S> {
    /// Creates a chain store over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Looks up a block by its hash.
    pub fn block_by_hash(&self, hash: &H256) -> Result<Option<Block>> {
        match self.store.get(&schema::block_key(hash))? {
            Some(bytes) => Ok(Some(Block::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Looks up the canonical block hash at `height`.
    pub fn block_hash_by_height(&self, height: u64) -> Result<Option<H256>> {
        match self.store.get(&schema::height_key(height))? {
            Some(bytes) if bytes.len() == 32 => Ok(Some(H256::from_slice(&bytes))),
            Some(_) => Err(CodecError::InvalidField("block hash length").into()),
            None => Ok(None),
        }
    }

    /// Looks up the canonical block at `height`.
    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>> {
        match self.block_hash_by_height(height)? {
            Some(hash) => self.block_by_hash(&hash),
            None => Ok(None),
        }
    }

    /// Resolves a transaction hash to its location in the chain.
    pub fn tx_meta(&self, tx_hash: &H256) -> Result<Option<TxMeta>> {
        match self.store.get(&schema::tx_meta_key(tx_hash))? {
            Some(bytes) => Ok(Some(TxMeta::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Looks up the receipt of a committed transaction.
    pub fn receipt(&self, tx_hash: &H256) -> Result<Option<Receipt>> {
        match self.store.get(&schema::receipt_key(tx_hash))? {
            Some(bytes) => Ok(Some(Receipt::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Records a meta entry for every transaction of `block` into `batch`.
    pub fn put_tx_metas(&self, batch: &mut Batch, block: &Block) -> Result<()> {
        for (index, tx) in block.transactions().iter().enumerate() {
            let meta = TxMeta {
                block_hash: block.hash(),
                height: block.height(),
                index: index as u32,
            };
            batch.put(schema::tx_meta_key(&tx.hash()), meta.encode());
        }
        Ok(())
    }

    /// Records a receipt into `batch` under its transaction hash.
    pub fn put_receipt(&self, batch: &mut Batch, receipt: &Receipt) -> Result<()> {
        batch.put(schema::receipt_key(&receipt.tx_hash), receipt.encode());
        Ok(())
    }

    /// Records `block` into `batch`: body by hash, then the height index.
    ///
    /// Must be the last chain write recorded before the batch flush, so a
    /// replay after a crash never finds a block whose state is absent.
    pub fn commit_block(&self, batch: &mut Batch, block: &Block) -> Result<()> {
        batch.put(schema::block_key(&block.hash()), block.encode());
        batch.put(
            schema::height_key(block.height()),
            block.hash().as_bytes().to_vec(),
        );
        debug!(height = block.height(), hash = ?block.hash(), "block recorded in batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::block::{BlockNonce, Header, Transaction};
    use crate::store::MemoryStore;
    use primitive_types::{H160, U256};

    fn test_block(height: u64, tx_count: u64) -> Block {
        let transactions: Vec<Transaction> = (0..tx_count)
            .map(|i| {
                Transaction::new(
                    i,
                    H160::repeat_byte(0x11),
                    H160::repeat_byte(0x22),
                    U256::from(100 * (i + 1)),
                    Vec::new(),
                )
            })
            .collect();
        let header = Header {
            parent_hash: H256::zero(),
            height,
            difficulty: U256::from(1),
            state_root: H256::repeat_byte(0x05),
            miner: H160::repeat_byte(0xAA),
            extra: Vec::new(),
            nonce: BlockNonce::default(),
            timestamp: 1_700_000_000,
        };
        Block::new(header, transactions, U256::from(1))
    }

    #[test]
    fn test_tx_meta_round_trip() {
        let meta = TxMeta {
            block_hash: H256::repeat_byte(0x07),
            height: 12,
            index: 3,
        };
        assert_eq!(TxMeta::decode(&meta.encode()).unwrap(), meta);
    }

    #[test]
    fn test_block_lookups_after_flush() {
        let store = Arc::new(MemoryStore::new());
        let chain = ChainStore::new(store.clone());
        let block = test_block(1, 2);

        let mut batch = Batch::new();
        chain.put_tx_metas(&mut batch, &block).unwrap();
        chain.commit_block(&mut batch, &block).unwrap();

        // Nothing visible before the flush
        assert!(chain.block_by_hash(&block.hash()).unwrap().is_none());
        store.write(&batch).unwrap();

        assert_eq!(chain.block_by_hash(&block.hash()).unwrap(), Some(block.clone()));
        assert_eq!(chain.block_hash_by_height(1).unwrap(), Some(block.hash()));
        assert_eq!(chain.block_by_height(1).unwrap(), Some(block.clone()));

        for (index, tx) in block.transactions().iter().enumerate() {
            let meta = chain.tx_meta(&tx.hash()).unwrap().unwrap();
            assert_eq!(meta.block_hash, block.hash());
            assert_eq!(meta.height, 1);
            assert_eq!(meta.index, index as u32);
        }
    }

    #[test]
    fn test_receipt_lookup() {
        let store = Arc::new(MemoryStore::new());
        let chain = ChainStore::new(store.clone());

        let receipt = Receipt {
            tx_hash: H256::repeat_byte(0x42),
            status: true,
            gas_used: 21000,
            output: Vec::new(),
        };
        let mut batch = Batch::new();
        chain.put_receipt(&mut batch, &receipt).unwrap();
        store.write(&batch).unwrap();

        assert_eq!(chain.receipt(&receipt.tx_hash).unwrap(), Some(receipt));
        assert_eq!(chain.receipt(&H256::repeat_byte(0x43)).unwrap(), None);
    }

    #[test]
    fn test_missing_lookups_are_none() {
        let chain = ChainStore::new(Arc::new(MemoryStore::new()));
        assert!(chain.block_by_hash(&H256::repeat_byte(0x01)).unwrap().is_none());
        assert!(chain.block_by_height(9).unwrap().is_none());
        assert!(chain.tx_meta(&H256::repeat_byte(0x02)).unwrap().is_none());
    }
}
