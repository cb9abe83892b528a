use crate::error::{BlockchainError, Result};
use crate::utils::{double_sha256_digest, sha256_digest};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of every digest in the system
pub const HASH_SIZE: usize = 32;

/// Longest hex string a digest can decode from
pub const MAX_HASH_STRING_SIZE: usize = HASH_SIZE * 2;

/// Fixed-width content digest used for block hashes, transaction ids,
/// and Merkle roots.
///
/// The all-zero value is the canonical null sentinel: it marks the genesis
/// block's parent and the Merkle root of an empty transaction set. Equality
/// is byte-wise. The string form is byte-reversed lowercase hex, the same
/// convention Bitcoin uses for displaying block hashes.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct HashId([u8; HASH_SIZE]);

impl HashId {
    /// The null/genesis-parent sentinel
    pub fn zero() -> HashId {
        HashId([0u8; HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Single-pass SHA-256 of the input
    pub fn hash(data: &[u8]) -> HashId {
        let digest = sha256_digest(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(digest.as_slice());
        HashId(bytes)
    }

    /// SHA-256 applied twice
    pub fn double_hash(data: &[u8]) -> HashId {
        let digest = double_sha256_digest(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(digest.as_slice());
        HashId(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<HashId> {
        if bytes.len() != HASH_SIZE {
            return Err(BlockchainError::InvalidHash);
        }
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(bytes);
        Ok(HashId(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Byte-reversed hex encoding with full zero padding
    pub fn encode(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        HEXLOWER.encode(&reversed)
    }

    /// Decode the byte-reversed hex form.
    ///
    /// Short input is zero-padded at the tail of the digest; input longer
    /// than the digest size fails with `InvalidHash`. Odd-length strings get
    /// a leading zero nibble before decoding.
    pub fn decode(src: &str) -> Result<HashId> {
        if src.len() > MAX_HASH_STRING_SIZE {
            return Err(BlockchainError::InvalidHash);
        }

        let padded = if src.len() % 2 == 0 {
            src.to_string()
        } else {
            format!("0{src}")
        };

        let raw = hex::decode(padded.as_bytes()).map_err(|_| BlockchainError::InvalidHash)?;

        // Decode into the tail of a zeroed buffer, then reverse, so short
        // strings end up padded exactly like the full-width form.
        let mut buf = [0u8; HASH_SIZE];
        buf[HASH_SIZE - raw.len()..].copy_from_slice(raw.as_slice());
        buf.reverse();
        Ok(HashId(buf))
    }
}

impl From<[u8; HASH_SIZE]> for HashId {
    fn from(bytes: [u8; HASH_SIZE]) -> HashId {
        HashId(bytes)
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}
