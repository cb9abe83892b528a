//! Minimal proof-of-work cryptocurrency node.
//!
//! The chain is a content-addressed linear sequence of blocks over an
//! account-balance ledger. Each node keeps a sled database for blocks and
//! accounts, a memory pool of pending transactions, an ECDSA keyring, and
//! talks to peers and clients over JSON-framed TCP.
//!
//! Layout:
//! - `core/`: blocks, transactions, Merkle commitments, proof of work,
//!   the ledger, and the chain state machine
//! - `storage/`: the content-addressed block store and the memory pool
//! - `wallet/`: key pairs, address derivation, and the node keyring
//! - `network/`: gossip between nodes and client RPC
//! - `miner/`: the background mining task
//! - `config/`: TOML settings with environment overrides
//! - `cli/`: command definitions for the node binary

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod miner;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use cli::{Command, Opt};
pub use config::{Settings, GLOBAL_CONFIG};
pub use core::{
    Account, Block, BlockHeader, Blockchain, HashId, Ledger, ProofOfWork, Transaction,
};
pub use error::{BlockchainError, Result};
pub use miner::Miner;
pub use network::{request, send_tx, Package, Response, Server, GLOBAL_NODES};
pub use storage::{
    BlockExchange, BlockStore, ContentAddress, MemoryPool, SledBlockStore, GLOBAL_MEMORY_POOL,
};
pub use wallet::{
    address_from_public_key, convert_address, hash_pub_key, validate_address, Keyring, Wallet,
    ADDRESS_CHECKSUM_LEN,
};
