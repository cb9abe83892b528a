//! Key management and address derivation
//!
//! Wallets hold ECDSA P-256 key pairs; addresses are base58-encoded,
//! checksummed hashes of the public key. The keyring tracks every key a
//! node has created and which one currently signs and mines.

pub mod keyring;
#[allow(clippy::module_inception)]
pub mod wallet;

pub use keyring::Keyring;
pub use wallet::{
    address_from_public_key, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECKSUM_LEN,
};
