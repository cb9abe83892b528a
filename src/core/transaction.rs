use crate::core::HashId;
use crate::error::{BlockchainError, Result};
use crate::utils::{
    current_timestamp_millis, deserialize, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, serialize,
};
use crate::wallet::address_from_public_key;
use serde::{Deserialize, Serialize};

/// Account-model value transfer.
///
/// `id` is the hash of the signing copy: the transaction with `id` zeroed
/// and `signature`/`public_key` emptied. `from` is always derived from
/// `public_key` - validators re-derive it and reject mismatches rather
/// than trusting the stored string.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: HashId,
    public_key: Vec<u8>,
    signature: Vec<u8>,
    timestamp: i64,
    nonce: u64,
    from: String,
    to: String,
    fee: u64,
    value: f64,
    data: String,
}

impl Transaction {
    /// Build an unsigned transaction; `from` is derived from the public key.
    pub fn new(public_key: &[u8], to: &str, value: f64, nonce: u64, data: &str) -> Result<Transaction> {
        let from = address_from_public_key(public_key);
        let mut tx = Transaction {
            id: HashId::zero(),
            public_key: public_key.to_vec(),
            signature: vec![],
            timestamp: current_timestamp_millis()?,
            nonce,
            from,
            to: to.to_string(),
            fee: 0,
            value,
            data: data.to_string(),
        };
        tx.update_id()?;
        Ok(tx)
    }

    /// Rebuild a transaction from pre-signed parts received over RPC.
    ///
    /// The caller supplies the exact timestamp the signature was made over;
    /// the id is recomputed locally and never trusted from the wire.
    #[allow(clippy::too_many_arguments)]
    pub fn from_signed_parts(
        public_key: &[u8],
        signature: &[u8],
        to: &str,
        value: f64,
        nonce: u64,
        timestamp: i64,
        data: &str,
    ) -> Result<Transaction> {
        let from = address_from_public_key(public_key);
        let mut tx = Transaction {
            id: HashId::zero(),
            public_key: public_key.to_vec(),
            signature: signature.to_vec(),
            timestamp,
            nonce,
            from,
            to: to.to_string(),
            fee: 0,
            value,
            data: data.to_string(),
        };
        tx.update_id()?;
        Ok(tx)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize::<Transaction>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// The copy whose serialization is both hashed for the id and signed:
    /// id zeroed, signature and public key stripped.
    fn signing_copy(&self) -> Transaction {
        Transaction {
            id: HashId::zero(),
            public_key: vec![],
            signature: vec![],
            timestamp: self.timestamp,
            nonce: self.nonce,
            from: self.from.clone(),
            to: self.to.clone(),
            fee: self.fee,
            value: self.value,
            data: self.data.clone(),
        }
    }

    pub fn calc_id(&self) -> Result<HashId> {
        let bytes = self.signing_copy().serialize()?;
        Ok(HashId::hash(bytes.as_slice()))
    }

    pub fn update_id(&mut self) -> Result<()> {
        self.id = self.calc_id()?;
        Ok(())
    }

    /// Sign the transaction with the wallet's PKCS8 key material
    pub fn sign(&mut self, pkcs8: &[u8]) -> Result<()> {
        let message = self.signing_copy().serialize()?;
        self.signature = ecdsa_p256_sha256_sign_digest(pkcs8, message.as_slice())?;
        Ok(())
    }

    pub fn verify_signature(&self) -> bool {
        let message = match self.signing_copy().serialize() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        ecdsa_p256_sha256_sign_verify(
            self.public_key.as_slice(),
            self.signature.as_slice(),
            message.as_slice(),
        )
    }

    /// The sender address the public key actually commits to
    pub fn derived_from(&self) -> String {
        address_from_public_key(self.public_key.as_slice())
    }

    /// Format/logic validation used on every block-accept path: value must
    /// be a non-negative finite number, the stored sender must match the
    /// key-derived one, and the signature must check out.
    pub fn validate(&self) -> Result<()> {
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(BlockchainError::Transaction(format!(
                "Invalid value {} in transaction {}",
                self.value, self.id
            )));
        }
        if self.from != self.derived_from() {
            return Err(BlockchainError::Transaction(format!(
                "Sender address {} does not match public key in transaction {}",
                self.from, self.id
            )));
        }
        if !self.verify_signature() {
            return Err(BlockchainError::Transaction(format!(
                "Invalid signature in transaction {}",
                self.id
            )));
        }
        Ok(())
    }

    pub fn get_id(&self) -> HashId {
        self.id
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_from(&self) -> &str {
        self.from.as_str()
    }

    pub fn get_to(&self) -> &str {
        self.to.as_str()
    }

    pub fn get_fee(&self) -> u64 {
        self.fee
    }

    pub fn get_value(&self) -> f64 {
        self.value
    }

    pub fn get_data(&self) -> &str {
        self.data.as_str()
    }
}
