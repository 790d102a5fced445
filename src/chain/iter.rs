// Tip-to-genesis block walk

use crate::core::{Block, Hash256};
use crate::error::{Error, Result};
use crate::storage::BlockchainDB;

/// Lazy walk from a starting hash back to genesis, following `prev_hash`.
/// Stops after the genesis block; build a new one for every walk.
pub struct BlockIterator {
    db: BlockchainDB,
    current: Option<Hash256>,
}

impl BlockIterator {
    pub fn new(db: BlockchainDB, start: Hash256) -> Self {
        Self {
            db,
            current: Some(start),
        }
    }
}

impl Iterator for BlockIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;

        match self.db.get_block(&hash) {
            Ok(Some(block)) => {
                if !block.is_genesis() {
                    self.current = Some(block.prev_hash);
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(Error::BlockNotFound(hash.to_hex()))),
            Err(e) => Some(Err(e)),
        }
    }
}
