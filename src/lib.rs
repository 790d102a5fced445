// UTXO ledger with a gossiping P2P network

pub mod chain;
pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use chain::{BlockIterator, Blockchain};
pub use cli::{Cli, CliHandler, Commands};
pub use config::NodeConfig;
pub use consensus::{BlockValidator, ProofOfWork, ValidationError};
pub use self::core::{Block, Hash256, MerkleTree, Transaction, TxInput, TxOutput};
pub use error::{Error, Result};
pub use network::{Client, Mempool, Message, Node, PeerSet};
pub use storage::{BlockchainDB, Storage, Utxo, UtxoSet};
pub use wallet::{Address, KeyPair, TransactionBuilder, Wallets};
