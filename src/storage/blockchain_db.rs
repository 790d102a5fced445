// Block store using sled

use crate::core::{Block, Hash256, Serializable};
use crate::error::{Error, Result};
use sled::Db;
use sled::transaction::{ConflictableTransactionError, TransactionError};

/// Reserved key holding the current tip hash
pub const LAST_HASH_KEY: &[u8] = b"lh";

/// Reserved key holding the difficulty the chain was created with
pub const DIFFICULTY_KEY: &[u8] = b"df";

/// Blocks keyed by their raw hash, plus the `"lh"` tip pointer
#[derive(Clone)]
pub struct BlockchainDB {
    db: Db,
}

impl BlockchainDB {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>> {
        match self.db.get(hash.as_bytes())? {
            Some(data) => Ok(Some(Block::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash256) -> Result<bool> {
        Ok(self.db.contains_key(hash.as_bytes())?)
    }

    /// Current tip hash, `None` for an empty store
    pub fn get_last_hash(&self) -> Result<Option<Hash256>> {
        match self.db.get(LAST_HASH_KEY)? {
            Some(data) => Ok(Some(Hash256::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Difficulty recorded with the genesis block, `None` if never recorded
    pub fn get_difficulty(&self) -> Result<Option<u32>> {
        match self.db.get(DIFFICULTY_KEY)? {
            Some(data) => {
                let bytes: [u8; 4] = data
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::Serialization("stored difficulty".to_string()))?;
                Ok(Some(u32::from_le_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Store `block` and point `"lh"` at it in one atomic transaction
    pub fn append_block(&self, block: &Block) -> Result<()> {
        self.append(block, None)
    }

    /// Store the genesis block, the tip and the chain difficulty together
    pub fn append_genesis(&self, genesis: &Block, difficulty: u32) -> Result<()> {
        self.append(genesis, Some(difficulty))
    }

    fn append(&self, block: &Block, difficulty: Option<u32>) -> Result<()> {
        let key = block.hash.as_bytes().to_vec();
        let value = block.serialize();
        let difficulty = difficulty.map(u32::to_le_bytes);

        self.db
            .transaction(|tx| {
                tx.insert(key.as_slice(), value.as_slice())?;
                tx.insert(LAST_HASH_KEY, key.as_slice())?;
                if let Some(difficulty) = &difficulty {
                    tx.insert(DIFFICULTY_KEY, difficulty.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<String>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(reason) => Error::TransactionAborted(reason),
                TransactionError::Storage(err) => Error::Storage(err),
            })
    }
}
