use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Pending transactions, one per sender.
///
/// ( K -> sender address, V -> Transaction )
///
/// Keying by sender enforces the single-pending-transaction rule: a second
/// submission from the same address is refused until the first confirms or
/// is purged.
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Admit a pending transaction, refusing a second one from the same
    /// sender.
    pub fn set_transaction(&self, tx: Transaction) -> Result<()> {
        let mut pool = self.inner.write().map_err(|_| {
            BlockchainError::Database("Failed to acquire write lock on memory pool".to_string())
        })?;
        let sender = tx.get_from().to_string();
        if pool.contains_key(sender.as_str()) {
            return Err(BlockchainError::AlreadyHasPendingTx);
        }
        pool.insert(sender, tx);
        Ok(())
    }

    /// Install a pending transaction unconditionally, replacing whatever
    /// the sender had queued. Used when re-admitting a transaction that is
    /// already known to supersede the pooled one.
    pub fn add_transaction(&self, tx: Transaction) -> Result<()> {
        let mut pool = self.inner.write().map_err(|_| {
            BlockchainError::Database("Failed to acquire write lock on memory pool".to_string())
        })?;
        pool.insert(tx.get_from().to_string(), tx);
        Ok(())
    }

    pub fn get(&self, sender: &str) -> Option<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.get(sender).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                None
            }
        }
    }

    pub fn contains_sender(&self, sender: &str) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.contains_key(sender),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                false
            }
        }
    }

    /// Pick the pending transactions ready for the next block.
    ///
    /// `lookup` resolves a sender to its confirmed (balance, nonce); a
    /// transaction is selected only when the balance covers its value and
    /// its nonce is exactly the account nonce plus one. Any lookup failure
    /// selects nothing rather than risk an invalid block.
    pub fn select_transactions<F>(&self, lookup: F) -> Vec<Transaction>
    where
        F: Fn(&str) -> Result<(f64, u64)>,
    {
        let pool = match self.inner.read() {
            Ok(pool) => pool,
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                return Vec::new();
            }
        };

        let mut senders: Vec<&String> = pool.keys().collect();
        senders.sort();

        let mut selected = Vec::new();
        for sender in senders {
            let tx = &pool[sender];
            let (balance, nonce) = match lookup(sender.as_str()) {
                Ok(state) => state,
                Err(e) => {
                    log::error!("Account lookup failed for {sender}: {e}");
                    return Vec::new();
                }
            };
            if balance >= tx.get_value() && tx.get_nonce() == nonce + 1 {
                selected.push(tx.clone());
            }
        }
        selected
    }

    /// Purge transactions that were confirmed in a block. A sender's slot
    /// is only freed when the pooled transaction is the confirmed one, so a
    /// different pending transaction is not dropped by mistake.
    pub fn remove_transactions(&self, confirmed: &[Transaction]) {
        match self.inner.write() {
            Ok(mut pool) => {
                for tx in confirmed {
                    if let Some(pending) = pool.get(tx.get_from()) {
                        if pending.get_id() == tx.get_id() {
                            pool.remove(tx.get_from());
                        }
                    }
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on memory pool");
            }
        }
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.values().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.is_empty(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory pool");
                true // Conservative default
            }
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.clear();
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on memory pool");
            }
        }
    }
}
