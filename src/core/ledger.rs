use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

const ACCOUNTS_TREE: &str = "accounts";

/// Per-address ledger entry. Accounts are created lazily the first time an
/// address receives funds; the nonce counts confirmed transactions sent
/// from the address.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Account {
    pub address: String,
    pub balance: f64,
    pub nonce: u64,
}

impl Account {
    fn new(address: &str) -> Account {
        Account {
            address: address.to_string(),
            balance: 0.0,
            nonce: 0,
        }
    }
}

/// Account-balance ledger over a sled tree.
///
/// Block application is two-phase: compute every address delta the block
/// implies, validate all of them against current balances, and only then
/// write. A single underfunded sender rejects the whole block with no
/// partial state.
pub struct Ledger {
    tree: sled::Tree,
    // serializes writers so validate-then-apply stays atomic
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(db: &sled::Db) -> Result<Ledger> {
        let tree = db.open_tree(ACCOUNTS_TREE)?;
        Ok(Ledger {
            tree,
            write_lock: Mutex::new(()),
        })
    }

    pub fn get_account(&self, address: &str) -> Result<Option<Account>> {
        match self.tree.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(deserialize::<Account>(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Balance of an address; unknown addresses read as zero
    pub fn get_balance(&self, address: &str) -> Result<f64> {
        Ok(self
            .get_account(address)?
            .map(|account| account.balance)
            .unwrap_or(0.0))
    }

    /// Confirmed-transaction count of an address; zero when unknown
    pub fn get_nonce(&self, address: &str) -> Result<u64> {
        Ok(self
            .get_account(address)?
            .map(|account| account.nonce)
            .unwrap_or(0))
    }

    fn put_account(&self, account: &Account) -> Result<()> {
        self.tree
            .insert(account.address.as_bytes(), serialize(account)?)?;
        Ok(())
    }

    /// Apply a single balance delta, optionally counting it as one
    /// confirmed send. Fails with `NotEnoughBalance` when the result
    /// would go negative.
    pub fn apply_delta(&self, address: &str, delta: f64, bump_nonce: bool) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| BlockchainError::Database(format!("Ledger lock poisoned: {e}")))?;
        self.apply_delta_unlocked(address, delta, if bump_nonce { 1 } else { 0 })
    }

    fn apply_delta_unlocked(&self, address: &str, delta: f64, sent_count: u64) -> Result<()> {
        let mut account = self
            .get_account(address)?
            .unwrap_or_else(|| Account::new(address));
        let next = account.balance + delta;
        if next < 0.0 {
            return Err(BlockchainError::NotEnoughBalance);
        }
        account.balance = next;
        account.nonce += sent_count;
        self.put_account(&account)
    }

    /// Net balance change per address implied by a block: every transfer
    /// debits its sender and credits its receiver, and the miner is
    /// credited the block reward.
    pub fn compute_block_deltas(block: &Block) -> HashMap<String, f64> {
        let mut deltas: HashMap<String, f64> = HashMap::new();
        for tx in block.get_transactions() {
            *deltas.entry(tx.get_from().to_string()).or_insert(0.0) -= tx.get_value();
            *deltas.entry(tx.get_to().to_string()).or_insert(0.0) += tx.get_value();
        }
        if block.get_reward() > 0.0 {
            *deltas.entry(block.get_miner().to_string()).or_insert(0.0) += block.get_reward();
        }
        deltas
    }

    fn validate_deltas(&self, deltas: &HashMap<String, f64>) -> Result<()> {
        for (address, delta) in deltas {
            if *delta >= 0.0 {
                continue;
            }
            let balance = self.get_balance(address).map_err(|e| {
                BlockchainError::CheckBalanceFailed(format!(
                    "Failed to read balance of {address}: {e}"
                ))
            })?;
            if balance + delta < 0.0 {
                return Err(BlockchainError::NotEnoughBalance);
            }
        }
        Ok(())
    }

    /// Validate and apply every delta a block implies. Fails without any
    /// write when a sender is underfunded (`NotEnoughBalance`) or a balance
    /// cannot be read (`CheckBalanceFailed`).
    pub fn apply_block_deltas(&self, block: &Block) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| BlockchainError::Database(format!("Ledger lock poisoned: {e}")))?;

        let deltas = Self::compute_block_deltas(block);
        self.validate_deltas(&deltas)?;

        // confirmed sends bump the sender's nonce once each
        let mut sent_counts: HashMap<&str, u64> = HashMap::new();
        for tx in block.get_transactions() {
            *sent_counts.entry(tx.get_from()).or_insert(0) += 1;
        }

        for (address, delta) in &deltas {
            let sent = sent_counts.get(address.as_str()).copied().unwrap_or(0);
            self.apply_delta_unlocked(address, *delta, sent)?;
        }
        Ok(())
    }
}
