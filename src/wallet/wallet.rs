use crate::error::{BlockchainError, Result};
use crate::utils::{base58_decode, base58_encode, ripemd160_digest, sha256_digest};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

const ADDRESS_VERSION: u8 = 0x00;
pub const ADDRESS_CHECKSUM_LEN: usize = 4;

/// ECDSA P-256 key pair. The address is derived from the public key and
/// never stored; transactions re-derive the sender from the key the same
/// way, so a wallet cannot claim an address its key does not hash to.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_address(&self) -> String {
        address_from_public_key(self.public_key.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

/// SHA-256 then RIPEMD-160 of the public key
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = sha256_digest(pub_key);
    ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECKSUM_LEN].to_vec()
}

/// Base58 address for a public-key hash: version byte, the hash, then a
/// four-byte double-SHA checksum.
pub fn convert_address(pub_hash_key: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![ADDRESS_VERSION];
    payload.extend(pub_hash_key);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    base58_encode(payload.as_slice())
}

/// The address a raw public key commits to
pub fn address_from_public_key(pub_key: &[u8]) -> String {
    convert_address(hash_pub_key(pub_key).as_slice())
}

/// Check the version/hash/checksum structure of an address string
pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };
    if payload.len() < ADDRESS_CHECKSUM_LEN + 1 {
        return false;
    }

    let actual_checksum = &payload[payload.len() - ADDRESS_CHECKSUM_LEN..];
    let versioned_hash = &payload[..payload.len() - ADDRESS_CHECKSUM_LEN];
    actual_checksum == checksum(versioned_hash).as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_is_valid_base58() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
        assert_eq!(address, address_from_public_key(wallet.get_public_key()));
    }

    #[test]
    fn test_distinct_wallets_get_distinct_addresses() {
        let a = Wallet::new().unwrap();
        let b = Wallet::new().unwrap();
        assert_ne!(a.get_address(), b.get_address());
    }

    #[test]
    fn test_corrupted_address_fails_validation() {
        let wallet = Wallet::new().unwrap();
        let mut address = wallet.get_address();
        // flip the last character to break the checksum
        let tail = if address.ends_with('1') { '2' } else { '1' };
        address.pop();
        address.push(tail);
        assert!(!validate_address(&address));
        assert!(!validate_address("not-base58-0OIl"));
        assert!(!validate_address(""));
    }
}
