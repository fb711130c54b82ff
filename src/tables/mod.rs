//! # Blockchain Cache Tables
//!
//! Concrete tables layered on the primitives. These are the small cache
//! tables the query layer consults on hot paths; the archival tables
//! (blocks, transactions, points) live with their codecs in the layer
//! above this crate.
//!
//! - [`StrongBlock`]: block confirmation presence, keyed by block hash
//! - [`TransactionState`] / [`TxStateRecord`]: stored-transaction
//!   confirmation state, keyed by transaction hash

mod strong_block;
mod transaction_state;

pub use strong_block::{StrongBlock, StrongBlockRecord, BLOCK_HASH_SIZE};
pub use transaction_state::{TransactionState, TxStateRecord, TxStates, TX_HASH_SIZE};
