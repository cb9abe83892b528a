use crate::core::{Block, HashId};
use crate::error::{BlockchainError, Result};
use crate::utils::{base58_decode, base58_encode, double_sha256_digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const ADDRESS_SIZE: usize = 32;

/// Content address of a stored block: double SHA-256 over the block's
/// canonical byte encoding, displayed in base58.
///
/// The all-zero value is the sentinel parent address of the genesis block.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct ContentAddress([u8; ADDRESS_SIZE]);

impl ContentAddress {
    pub fn zero() -> ContentAddress {
        ContentAddress([0u8; ADDRESS_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Derive the address a block would be stored under
    pub fn from_block(block: &Block) -> Result<ContentAddress> {
        let bytes = block.serialize()?;
        let digest = double_sha256_digest(bytes.as_slice());
        let mut out = [0u8; ADDRESS_SIZE];
        out.copy_from_slice(digest.as_slice());
        Ok(ContentAddress(out))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ContentAddress> {
        if bytes.len() != ADDRESS_SIZE {
            return Err(BlockchainError::InvalidAddress(format!(
                "Content address must be {ADDRESS_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; ADDRESS_SIZE];
        out.copy_from_slice(bytes);
        Ok(ContentAddress(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn encode(&self) -> String {
        base58_encode(&self.0)
    }

    pub fn decode(src: &str) -> Result<ContentAddress> {
        let raw = base58_decode(src)?;
        ContentAddress::from_bytes(raw.as_slice())
    }

    /// The raw digest as a hash id, for display alongside block hashes
    pub fn as_hash(&self) -> HashId {
        HashId::from(self.0)
    }
}

impl From<HashId> for ContentAddress {
    fn from(hash: HashId) -> ContentAddress {
        let mut out = [0u8; ADDRESS_SIZE];
        out.copy_from_slice(hash.as_bytes());
        ContentAddress(out)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Content-addressed block storage seam.
///
/// The chain never talks to a database directly; every block read and write
/// goes through this trait so the backing store can be swapped out.
pub trait BlockExchange: Send + Sync {
    /// Whether a block is present under the given address
    fn has(&self, address: &ContentAddress) -> Result<bool>;

    /// Fetch a block by address; `Ok(None)` when absent
    fn get(&self, address: &ContentAddress) -> Result<Option<Block>>;

    /// Store a block under its derived content address and return it
    fn put(&self, block: &Block) -> Result<ContentAddress>;

    /// Whether the store is reachable. Callers must fail closed with
    /// `ExchangeNotOnline` when this reports false.
    fn is_online(&self) -> bool;
}

const BLOCKS_TREE: &str = "blocks";

/// Sled-backed block store keyed by content address
pub struct SledBlockStore {
    tree: sled::Tree,
}

impl SledBlockStore {
    pub fn new(db: &sled::Db) -> Result<SledBlockStore> {
        let tree = db.open_tree(BLOCKS_TREE)?;
        Ok(SledBlockStore { tree })
    }
}

impl BlockExchange for SledBlockStore {
    fn has(&self, address: &ContentAddress) -> Result<bool> {
        Ok(self.tree.contains_key(address.as_bytes())?)
    }

    fn get(&self, address: &ContentAddress) -> Result<Option<Block>> {
        match self.tree.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    fn put(&self, block: &Block) -> Result<ContentAddress> {
        let address = ContentAddress::from_block(block)?;
        self.tree.insert(address.as_bytes(), block.serialize()?)?;
        Ok(address)
    }

    fn is_online(&self) -> bool {
        true
    }
}

/// Shared handle used across the chain, miner, and network layers
pub type BlockStore = Arc<dyn BlockExchange>;
