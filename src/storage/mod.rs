//! Persistence and pending state
//!
//! Content-addressed block storage behind the `BlockExchange` seam, and
//! the in-memory pool of pending transactions.

pub mod block_store;
pub mod memory_pool;

pub use block_store::{BlockExchange, BlockStore, ContentAddress, SledBlockStore};
pub use memory_pool::MemoryPool;

use once_cell::sync::Lazy;

/// Global memory pool shared by the network server and the miner
pub static GLOBAL_MEMORY_POOL: Lazy<MemoryPool> = Lazy::new(MemoryPool::new);
