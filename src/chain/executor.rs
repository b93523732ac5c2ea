//! The block commit pipeline.
//!
//! For one fully executed block the executor sequences: transaction metas,
//! receipts, the state commit, and the block itself into a single height
//! batch, flushes the batch atomically, and publishes `CommitComplete`.
//! Receipts and tx metas can be re-derived from block contents on replay;
//! the state delta cannot, so state is written last among the batch's
//! records, followed only by the block. A crash between flush and event
//! publication is therefore recoverable by replaying the height from the
//! store.
//!
//! The pipeline is single-writer: at most one block commits at a time,
//! and heights commit in order (enforced by the caller).

use std::sync::Arc;

use primitive_types::H256;
use thiserror::Error;
use tracing::{error, info};

use crate::merkle::{TreeConfig, TreeError};
use crate::state::State;
use crate::store::{Batch, KvStore, StoreError};

use super::block::{Block, Receipt};
use super::events::{CommitComplete, EventHub};
use super::store::{ChainError, ChainStore};

/// Commit pipeline errors. All are fatal for the height: the context is
/// dropped, no event is published, and the caller must reload state at
/// the previously committed root before retrying.
#[derive(Error, Debug)]
pub enum CommitError {
    /// The executed receipts do not match the block's transactions.
    #[error("receipts mismatch: block has {txs} transactions, {receipts} receipts cached")]
    ReceiptsMismatch { txs: usize, receipts: usize },
    /// The header's state root disagrees with the committed root.
    #[error("state root mismatch: header {header:?}, committed {committed:?}")]
    StateRootMismatch { header: H256, committed: H256 },
    /// The context was built for a different height than the block.
    #[error("commit context height {context} does not match block height {block}")]
    HeightMismatch { context: u64, block: u64 },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CommitError>;

/// Everything a single height's commit owns: the write batch and the
/// receipts produced by execution.
///
/// Contexts for distinct heights are independent by construction, and a
/// context is consumed by the commit, so nothing keyed by the height can
/// go stale after the flush.
pub struct CommitContext {
    height: u64,
    batch: Batch,
    receipts: Option<Vec<Receipt>>,
}

impl CommitContext {
    /// Creates an empty context for `height`.
    pub fn new(height: u64) -> Self {
        Self {
            height,
            batch: Batch::new(),
            receipts: None,
        }
    }

    /// Attaches the receipts produced by executing the block.
    pub fn set_receipts(&mut self, receipts: Vec<Receipt>) {
        self.receipts = Some(receipts);
    }

    /// Returns the context's height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Returns the batch, for staging additional height-scoped writes.
    pub fn batch_mut(&mut self) -> &mut Batch {
        &mut self.batch
    }
}

/// Drives per-block persistence.
pub struct Executor<S> {
    store: Arc<S>,
    chain: ChainStore<S>,
    state: State<S>,
    events: EventHub,
    /// Speculative version counter handed out during execution; reset
    /// once the block is durable.
    version: u64,
}

impl<S: KvStore> Executor<S> {
    /// Creates an executor with state initialized at `root` (`None` for a
    /// fresh chain).
    pub fn new(store: Arc<S>, config: TreeConfig, root: Option<H256>) -> Result<Self> {
        let state = State::new(store.clone(), config, root)?;
        Ok(Self {
            chain: ChainStore::new(store.clone()),
            store,
            state,
            events: EventHub::new(),
            version: 0,
        })
    }

    /// Returns the world state, for execution to apply write-sets.
    pub fn state_mut(&mut self) -> &mut State<S> {
        &mut self.state
    }

    /// Returns the chain store, for lookups.
    pub fn chain(&self) -> &ChainStore<S> {
        &self.chain
    }

    /// Registers a subscriber for `CommitComplete` events.
    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<CommitComplete> {
        self.events.subscribe()
    }

    /// Hands out the next speculative version for in-flight execution.
    pub fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Commits `block` at its height: tx metas, receipts, state, block,
    /// then one atomic flush and an asynchronous `CommitComplete`.
    ///
    /// On failure nothing was flushed and no event is published; the
    /// caller must reload state at the previously committed root.
    pub fn commit(&mut self, mut ctx: CommitContext, block: Arc<Block>) -> Result<()> {
        if ctx.height != block.height() {
            return Err(CommitError::HeightMismatch {
                context: ctx.height,
                block: block.height(),
            });
        }

        if let Err(err) = self.chain.put_tx_metas(&mut ctx.batch, &block) {
            error!(height = ctx.height, %err, "failed to persist tx metas");
            return Err(err.into());
        }

        if let Some(receipts) = ctx.receipts.take() {
            if receipts.len() != block.transactions().len() {
                return Err(CommitError::ReceiptsMismatch {
                    txs: block.transactions().len(),
                    receipts: receipts.len(),
                });
            }
            for receipt in &receipts {
                self.chain.put_receipt(&mut ctx.batch, receipt)?;
            }
        }

        let root = match self.state.commit(&mut ctx.batch) {
            Ok(root) => root,
            Err(err) => {
                error!(height = ctx.height, %err, "failed to put state in batch");
                return Err(err.into());
            }
        };
        if root != block.header().state_root {
            error!(
                height = ctx.height,
                header = ?block.header().state_root,
                committed = ?root,
                "state root mismatch",
            );
            return Err(CommitError::StateRootMismatch {
                header: block.header().state_root,
                committed: root,
            });
        }

        self.chain.commit_block(&mut ctx.batch, &block)?;

        if let Err(err) = self.store.write(&ctx.batch) {
            error!(height = ctx.height, %err, "failed to flush commit batch");
            return Err(err.into());
        }

        info!(height = block.height(), hash = ?block.hash(), "new block committed");
        self.events.publish(CommitComplete {
            block: block.clone(),
        });
        self.reset_version();
        Ok(())
    }

    fn reset_version(&mut self) {
        self.version = 0;
    }
}
