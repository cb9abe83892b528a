//! Chain data structures and consensus rules
//!
//! Blocks, transactions, the Merkle commitment, proof of work, the account
//! ledger, and the chain state machine that ties them together.

pub mod block;
pub mod blockchain;
pub mod hash_id;
pub mod ledger;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, BlockHeader, BLOCK_VERSION};
pub use blockchain::{Blockchain, ChainIterator, MAX_REORG_DEPTH};
pub use hash_id::{HashId, HASH_SIZE, MAX_HASH_STRING_SIZE};
pub use ledger::{Account, Ledger};
pub use merkle::{merkle_root, verify_transactions};
pub use proof_of_work::ProofOfWork;
pub use transaction::Transaction;
