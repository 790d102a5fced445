// Crate-wide error type

use crate::consensus::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("storage transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no existing blockchain found")]
    ChainNotFound,

    #[error("blockchain already exists")]
    ChainExists,

    #[error("difficulty {0} out of range 1..=255")]
    InvalidDifficulty(u32),

    #[error("chain was created with difficulty {stored}, node configured with {configured}")]
    DifficultyMismatch { stored: u32, configured: u32 },

    #[error("block {0} not found")]
    BlockNotFound(String),

    #[error("block at height {0} not found")]
    HeightNotFound(u64),

    #[error("transaction {0} does not exist")]
    TransactionNotFound(String),

    #[error("transaction {tx} references missing output {index}")]
    OutputNotFound { tx: String, index: u32 },

    #[error("merkle tree needs at least one leaf")]
    EmptyMerkleTree,

    #[error("block rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("not enough funds: have {available}, need {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no key for address {0}")]
    UnknownWallet(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] secp256k1::Error),

    #[error("malformed message: {0}")]
    Message(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("peer set is empty")]
    NoPeers,
}

pub type Result<T> = std::result::Result<T, Error>;
