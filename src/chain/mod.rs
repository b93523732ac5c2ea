//! Chain layer: block records, indexed storage, and the commit pipeline.

mod block;
mod events;
mod executor;
mod store;

pub use block::{Block, BlockNonce, Header, Receipt, Transaction};
pub use events::{CommitComplete, EventHub};
pub use executor::{CommitContext, CommitError, Executor};
pub use store::{ChainError, ChainStore, TxMeta};
