use crate::core::HashId;
use crate::error::Result;
use crate::utils::current_timestamp_micros;
use num_bigint::{BigInt, Sign};
use std::sync::atomic::{AtomicBool, Ordering};

/// Hash width in bits; difficulty counts leading target bits out of this
const TARGET_BITS_MAX: u32 = 256;

/// Proof-of-work search and verification over a block header commitment.
///
/// The committed data is prev_hash ++ merkle_root ++ extra ++ difficulty ++
/// nonce, hashed once with SHA-256. A nonce wins when the digest, read as a
/// big-endian unsigned integer, is strictly below the target.
pub struct ProofOfWork {
    difficulty: u32,
    target: BigInt,
    nonce: i64,
    result_hash: HashId,
    elapsed_micros: i64,
}

impl ProofOfWork {
    /// Set up a search for the given difficulty. The target is
    /// 1 << (256 - difficulty), so each extra bit of difficulty halves the
    /// winning fraction of the hash space.
    pub fn new(difficulty: u32) -> ProofOfWork {
        let bits = difficulty.clamp(1, TARGET_BITS_MAX - 1);
        let target = BigInt::from(1) << (TARGET_BITS_MAX - bits);
        ProofOfWork {
            difficulty: bits,
            target,
            nonce: 0,
            result_hash: HashId::zero(),
            elapsed_micros: 0,
        }
    }

    fn prepare_data(&self, prev_hash: &HashId, merkle_root: &HashId, extra: &[u8], nonce: i64) -> Vec<u8> {
        let mut data = Vec::with_capacity(
            prev_hash.as_bytes().len() + merkle_root.as_bytes().len() + extra.len() + 12,
        );
        data.extend_from_slice(prev_hash.as_bytes());
        data.extend_from_slice(merkle_root.as_bytes());
        data.extend_from_slice(extra);
        data.extend_from_slice(&self.difficulty.to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    fn meets_target(&self, hash: &HashId) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash.as_bytes()) < self.target
    }

    /// Search nonces from zero until a digest falls below the target or the
    /// cancel flag flips. Returns true on success, with the winning nonce,
    /// its digest, and the elapsed time recorded; a cancelled or exhausted
    /// search records nothing.
    pub fn solve(
        &mut self,
        prev_hash: &HashId,
        merkle_root: &HashId,
        extra: &[u8],
        cancel: &AtomicBool,
    ) -> Result<bool> {
        let started = current_timestamp_micros()?;
        let mut nonce: i64 = 0;
        while nonce < i64::MAX {
            if cancel.load(Ordering::Relaxed) {
                log::debug!("proof-of-work search cancelled at nonce {nonce}");
                return Ok(false);
            }
            let data = self.prepare_data(prev_hash, merkle_root, extra, nonce);
            let hash = HashId::hash(data.as_slice());
            if self.meets_target(&hash) {
                self.nonce = nonce;
                self.result_hash = hash;
                self.elapsed_micros = current_timestamp_micros()? - started;
                return Ok(true);
            }
            nonce += 1;
        }
        Ok(false)
    }

    /// Re-run the single hash for a claimed nonce and check it against the
    /// target. Used on every block-accept path.
    pub fn validate(&self, prev_hash: &HashId, merkle_root: &HashId, extra: &[u8], nonce: i64) -> bool {
        let data = self.prepare_data(prev_hash, merkle_root, extra, nonce);
        let hash = HashId::hash(data.as_slice());
        self.meets_target(&hash)
    }

    pub fn get_target(&self) -> &BigInt {
        &self.target
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn get_result_hash(&self) -> HashId {
        self.result_hash
    }

    pub fn get_elapsed_micros(&self) -> i64 {
        self.elapsed_micros
    }
}
