//! Background mining task
//!
//! Assembles a candidate block from the memory pool, runs the
//! proof-of-work search, and submits the result. A foreign block arriving
//! over the network flips the shared cancel flag and abandons the current
//! search, since its candidate no longer extends the head.

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Blockchain, ProofOfWork};
use crate::error::{BlockchainError, Result};
use crate::network::broadcast_block;
use crate::storage::{ContentAddress, GLOBAL_MEMORY_POOL};
use crate::wallet::Keyring;
use log::{error, info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

pub struct Miner {
    blockchain: Blockchain,
    keyring: Arc<RwLock<Keyring>>,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(
        blockchain: Blockchain,
        keyring: Arc<RwLock<Keyring>>,
        cancel: Arc<AtomicBool>,
    ) -> Miner {
        Miner {
            blockchain,
            keyring,
            cancel,
        }
    }

    /// Run the mining loop on its own thread. The loop only exits when
    /// candidate assembly itself fails, which means local state is broken.
    pub fn start(self) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            info!("Miner started");
            loop {
                self.cancel.store(false, Ordering::Relaxed);
                match self.mine_once() {
                    Ok(true) => {}
                    Ok(false) => {
                        // cancelled or rejected; retry against the new head
                    }
                    Err(e) => {
                        error!("Mining stopped: {e}");
                        break;
                    }
                }
                thread::sleep(jittered_interval());
            }
        })
    }

    /// One full candidate cycle: assemble, solve, submit, announce.
    /// `Ok(false)` means the search was cancelled or the block did not
    /// make it onto the chain.
    fn mine_once(&self) -> Result<bool> {
        let mut block = self
            .assemble_candidate()
            .map_err(|e| BlockchainError::Mining(format!("Failed to assemble candidate: {e}")))?;

        let mut pow = ProofOfWork::new(block.get_difficulty());
        let solved = pow.solve(
            &block.get_prev_hash(),
            &block.get_merkle_root(),
            block.get_miner().as_bytes(),
            &self.cancel,
        )?;
        if !solved {
            return Ok(false);
        }

        block.set_nonce(pow.get_nonce());
        block.update_hash()?;
        info!(
            "Solved block at height {} in {}us (nonce {})",
            block.get_height(),
            pow.get_elapsed_micros(),
            pow.get_nonce()
        );

        self.submit(&block)
    }

    /// Hand a solved candidate to the chain. A candidate that went stale
    /// between the solve and the submit fails block validation; that is a
    /// lost race, not a reason to stop mining.
    fn submit(&self, block: &Block) -> Result<bool> {
        match self.blockchain.add_block(block) {
            Ok(Some(address)) => {
                GLOBAL_MEMORY_POOL.remove_transactions(block.get_transactions());
                broadcast_block("", block);
                info!(
                    "Mined block at height {} with {} transactions ({address})",
                    block.get_height(),
                    block.get_tx_count()
                );
                Ok(true)
            }
            Ok(None) => {
                warn!(
                    "Own candidate at height {} rejected by ledger",
                    block.get_height()
                );
                Ok(false)
            }
            Err(BlockchainError::InvalidBlock(reason)) => {
                info!(
                    "Candidate at height {} went stale: {reason}",
                    block.get_height()
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Build the next candidate on top of the current head, with whatever
    /// pending transactions the ledger can currently afford.
    fn assemble_candidate(&self) -> Result<Block> {
        let head = self.blockchain.get_head();
        let head_address = ContentAddress::from_block(&head)?;

        let miner_address = self
            .keyring
            .read()
            .map_err(|_| {
                BlockchainError::Wallet("Failed to acquire read lock on keyring".to_string())
            })?
            .active_address()
            .to_string();

        let ledger = self.blockchain.get_ledger();
        let transactions = GLOBAL_MEMORY_POOL.select_transactions(|sender| {
            let balance = ledger.get_balance(sender)?;
            let nonce = ledger.get_nonce(sender)?;
            Ok((balance, nonce))
        });

        let height = head.get_height() + 1;
        let memo = candidate_memo(&GLOBAL_CONFIG.mining.memo);
        Block::new(
            height,
            head.get_hash()?,
            head_address,
            &miner_address,
            self.blockchain.next_difficulty(),
            &memo,
            self.blockchain.calc_reward(height),
            transactions,
        )
    }
}

/// Tag the configured memo with a one-off id so concurrent miners never
/// produce byte-identical candidates.
fn candidate_memo(configured: &str) -> String {
    let tag = Uuid::new_v4();
    if configured.is_empty() {
        tag.to_string()
    } else {
        format!("{configured} {tag}")
    }
}

/// Pause between candidates: the configured block interval, jittered
/// between half and one-and-a-half times so nodes desynchronize.
fn jittered_interval() -> Duration {
    let base_millis = GLOBAL_CONFIG.mining.expected_block_interval_secs * 1000;
    let factor = rand::thread_rng().gen_range(0.5..=1.5);
    Duration::from_millis((base_millis as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::storage::{BlockStore, SledBlockStore};

    fn solve(block: &mut Block) {
        let cancel = AtomicBool::new(false);
        let mut pow = ProofOfWork::new(block.get_difficulty());
        assert!(pow
            .solve(
                &block.get_prev_hash(),
                &block.get_merkle_root(),
                block.get_miner().as_bytes(),
                &cancel,
            )
            .unwrap());
        block.set_nonce(pow.get_nonce());
        block.update_hash().unwrap();
    }

    #[test]
    fn test_stale_candidate_is_a_lost_race_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("miner-db")).unwrap();
        let store: BlockStore = Arc::new(SledBlockStore::new(&db).unwrap());
        let blockchain = Blockchain::open(&db, store, &Settings::default()).unwrap();
        let keyring = Keyring::open(&dir.path().join("keyring.dat")).unwrap();
        let miner = Miner::new(
            blockchain.clone(),
            Arc::new(RwLock::new(keyring)),
            Arc::new(AtomicBool::new(false)),
        );

        let mut stale = miner.assemble_candidate().unwrap();
        solve(&mut stale);

        // a competing block at the same height lands first
        let head = blockchain.get_head();
        let mut competing = Block::new(
            1,
            head.get_hash().unwrap(),
            ContentAddress::from_block(&head).unwrap(),
            "rival",
            blockchain.next_difficulty(),
            "",
            blockchain.calc_reward(1),
            vec![],
        )
        .unwrap();
        solve(&mut competing);
        blockchain.add_block(&competing).unwrap();

        // submitting the now-stale candidate must not surface an error,
        // or the mining loop would stop for good
        assert!(matches!(miner.submit(&stale), Ok(false)));
        assert_eq!(blockchain.get_height(), 1);
        assert_eq!(
            blockchain.get_head().get_hash().unwrap(),
            competing.get_hash().unwrap()
        );
    }

    #[test]
    fn test_candidate_memo_is_unique() {
        let a = candidate_memo("steady");
        let b = candidate_memo("steady");
        assert_ne!(a, b);
        assert!(a.starts_with("steady "));
        assert!(!candidate_memo("").is_empty());
    }

    #[test]
    fn test_jittered_interval_stays_in_band() {
        let base = GLOBAL_CONFIG.mining.expected_block_interval_secs * 1000;
        for _ in 0..50 {
            let interval = jittered_interval().as_millis() as u64;
            assert!(interval >= base / 2);
            assert!(interval <= base + base / 2);
        }
    }
}
