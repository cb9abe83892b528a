//! Error handling for the node
//!
//! This module provides the error types shared by every component of the chain.

use std::fmt;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for all node operations
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// Database-related errors
    Database(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Transaction validation errors
    Transaction(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Block validation errors
    InvalidBlock(String),
    /// Mining errors
    Mining(String),
    /// Malformed digest string (longer than the digest size allows)
    InvalidHash,
    /// Block height query outside [0, head.height]
    InvalidHeight,
    /// Block lookup miss - callers may treat as absence
    BlockNotFound,
    /// Transaction lookup miss - callers may treat as absence
    NotFoundTransaction,
    /// A balance delta would drive an account negative; rejects the whole batch
    NotEnoughBalance,
    /// The account store failed while simulating a delta batch
    CheckBalanceFailed(String),
    /// The block storage/exchange collaborator is unavailable
    ExchangeNotOnline,
    /// The sender already has a pending transaction in the mempool
    AlreadyHasPendingTx,
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
            BlockchainError::InvalidHash => write!(f, "Invalid hash"),
            BlockchainError::InvalidHeight => write!(f, "Invalid block height"),
            BlockchainError::BlockNotFound => write!(f, "Block is not found"),
            BlockchainError::NotFoundTransaction => write!(f, "Transaction is not found"),
            BlockchainError::NotEnoughBalance => write!(f, "Not enough account balance"),
            BlockchainError::CheckBalanceFailed(msg) => {
                write!(f, "Checking of account balance failed: {msg}")
            }
            BlockchainError::ExchangeNotOnline => write!(f, "Block exchange is not online"),
            BlockchainError::AlreadyHasPendingTx => {
                write!(f, "Account already has a pending transaction")
            }
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
