use crate::core::{merkle, HashId, Transaction};
use crate::error::Result;
use crate::storage::ContentAddress;
use crate::utils::{current_timestamp_millis, deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Header format version stamped on every block
pub const BLOCK_VERSION: &str = "0.0.1";

/// The hashed portion of a block. The block hash commits to the header
/// only - height and the transaction list are covered indirectly through
/// `merkle_root` and the parent linkage.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockHeader {
    pub version: String,
    pub prev_hash: HashId,
    pub merkle_root: HashId,
    pub timestamp: i64,
    pub nonce: i64,
    pub miner: String,
    pub difficulty: u32,
    pub memo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    height: u64,
    /// Cached header hash. Not authoritative: mutating any header field
    /// silently stales it, so validation always goes through `get_hash()`.
    hash: HashId,
    /// Content address of the parent block, so ancestors can be fetched
    /// through the block exchange during reorg and sync walks
    prev_address: ContentAddress,
    header: BlockHeader,
    reward: f64,
    tx_count: u64,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a mutable block draft. The draft becomes final once the
    /// proof-of-work search fills in the nonce and `update_hash` runs.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        height: u64,
        prev_hash: HashId,
        prev_address: ContentAddress,
        miner: &str,
        difficulty: u32,
        memo: &str,
        reward: f64,
        transactions: Vec<Transaction>,
    ) -> Result<Block> {
        let merkle_root = merkle::merkle_root(transactions.as_slice())?;
        let tx_count = transactions.len() as u64;
        let mut block = Block {
            height,
            hash: HashId::zero(),
            prev_address,
            header: BlockHeader {
                version: BLOCK_VERSION.to_string(),
                prev_hash,
                merkle_root,
                timestamp: current_timestamp_millis()?,
                nonce: 0,
                miner: miner.to_string(),
                difficulty,
                memo: memo.to_string(),
            },
            reward,
            tx_count,
            transactions,
        };
        block.update_hash()?;
        Ok(block)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// Recompute the header hash. Always preferred over the cached field.
    pub fn get_hash(&self) -> Result<HashId> {
        let header_bytes = serialize(&self.header)?;
        Ok(HashId::hash(header_bytes.as_slice()))
    }

    /// Refresh the cached hash from the current header contents
    pub fn update_hash(&mut self) -> Result<HashId> {
        self.hash = self.get_hash()?;
        Ok(self.hash)
    }

    /// The cached hash as last computed by `update_hash`
    pub fn cached_hash(&self) -> HashId {
        self.hash
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_prev_address(&self) -> ContentAddress {
        self.prev_address
    }

    pub fn get_header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn get_prev_hash(&self) -> HashId {
        self.header.prev_hash
    }

    pub fn get_merkle_root(&self) -> HashId {
        self.header.merkle_root
    }

    pub fn get_timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.header.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.header.difficulty
    }

    pub fn get_miner(&self) -> &str {
        self.header.miner.as_str()
    }

    pub fn get_memo(&self) -> &str {
        self.header.memo.as_str()
    }

    pub fn get_reward(&self) -> f64 {
        self.reward
    }

    pub fn get_tx_count(&self) -> u64 {
        self.tx_count
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    /// Set the winning nonce found by the proof-of-work search
    pub fn set_nonce(&mut self, nonce: i64) {
        self.header.nonce = nonce;
    }

    /// Override the creation timestamp. Used to pin the genesis block so
    /// every node derives the identical content address for it.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.header.timestamp = timestamp;
    }

    /// Verify that the header's Merkle root matches the transaction list
    pub fn verify_merkle_root(&self) -> Result<bool> {
        merkle::verify_transactions(self.transactions.as_slice(), &self.header.merkle_root)
    }
}
