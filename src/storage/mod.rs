// Storage layer for blocks and the UTXO index

mod blockchain_db;
mod utxo_set;

pub use blockchain_db::{BlockchainDB, DIFFICULTY_KEY, LAST_HASH_KEY};
pub use utxo_set::{Utxo, UtxoSet};

use crate::error::Result;
use std::path::Path;

/// Tree holding the UTXO index, separate from the block keys
const UTXO_TREE: &str = "utxo";

/// Storage manager - one sled database per node
#[derive(Clone)]
pub struct Storage {
    db: sled::Db,
}

impl Storage {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Create an in-memory storage (for testing)
    pub fn memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Whether a database already exists at `path`
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().join("conf").exists()
    }

    pub fn blocks(&self) -> BlockchainDB {
        BlockchainDB::new(self.db.clone())
    }

    pub fn utxo_tree(&self) -> Result<sled::Tree> {
        Ok(self.db.open_tree(UTXO_TREE)?)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
