//! Key-value storage layer.
//!
//! This module defines the abstract store the engine runs on, the atomic
//! write batch that carries a block's side effects, and the normative key
//! schema shared by the state tree and the chain store.

mod kv;
pub mod schema;

pub use kv::{Batch, BatchOp, KvStore, MemoryStore, Result, StoreError};
