//! Merkle commitment over an ordered transaction set
//!
//! The tree is rebuilt from scratch on every block assembly; nothing is
//! incrementally updated. Identical transaction order produces an identical
//! root, and order matters.

use crate::core::{HashId, Transaction};
use crate::error::Result;

/// Digest of the padding leaf used to keep every level even
fn null_leaf() -> HashId {
    HashId::hash(&[])
}

/// Build a binary Merkle tree over the ordered transaction list and return
/// its root digest.
///
/// Leaf digest = hash(serialize(tx)); internal node = hash(left ++ right) in
/// left-then-right order; odd levels are padded with a null leaf. An empty
/// list yields the all-zero sentinel rather than a computed hash.
pub fn merkle_root(transactions: &[Transaction]) -> Result<HashId> {
    if transactions.is_empty() {
        return Ok(HashId::zero());
    }

    let mut level: Vec<HashId> = Vec::with_capacity(transactions.len() + 1);
    for tx in transactions {
        let bytes = tx.serialize()?;
        level.push(HashId::hash(bytes.as_slice()));
    }

    // Odd input count gets one null leaf before the first pairing pass
    if level.len() % 2 != 0 {
        level.push(null_leaf());
    }

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(null_leaf());
        }
        let mut next_level = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut combined = Vec::with_capacity(pair[0].as_bytes().len() * 2);
            combined.extend_from_slice(pair[0].as_bytes());
            combined.extend_from_slice(pair[1].as_bytes());
            next_level.push(HashId::hash(combined.as_slice()));
        }
        level = next_level;
    }

    Ok(level[0])
}

/// Check that a transaction list reproduces the expected root
pub fn verify_transactions(transactions: &[Transaction], expected_root: &HashId) -> Result<bool> {
    let calculated = merkle_root(transactions)?;
    Ok(calculated == *expected_root)
}
