// Block validation against the current tip

use crate::consensus::pow::ProofOfWork;
use crate::core::{Block, Transaction};
use crate::error::Result;
use thiserror::Error;

/// Reasons a block is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("previous hash {got} does not match tip {tip}")]
    PrevHashMismatch { got: String, tip: String },

    #[error("invalid transaction {0}")]
    InvalidTransaction(String),

    #[error("invalid proof of work for block {0}")]
    InvalidProofOfWork(String),

    #[error("stored hash {stored} does not match computed hash {computed}")]
    HashMismatch { stored: String, computed: String },
}

/// Block validator
pub struct BlockValidator {
    difficulty: u32,
}

impl BlockValidator {
    pub fn new(difficulty: u32) -> Self {
        Self { difficulty }
    }

    /// Validate `block` as the successor of `tip`.
    ///
    /// `verify_tx` checks one transaction's signatures against the chain.
    /// A height other than `tip.height + 1` is only logged.
    pub fn validate<F>(&self, block: &Block, tip: &Block, mut verify_tx: F) -> Result<()>
    where
        F: FnMut(&Transaction) -> Result<bool>,
    {
        if block.height != tip.height + 1 {
            log::warn!(
                "Block {} has height {}, expected {} (tip {})",
                block.hash,
                block.height,
                tip.height + 1,
                tip.hash
            );
        }

        if block.prev_hash != tip.hash {
            return Err(ValidationError::PrevHashMismatch {
                got: block.prev_hash.to_hex(),
                tip: tip.hash.to_hex(),
            }
            .into());
        }

        for tx in &block.transactions {
            let valid = match verify_tx(tx) {
                Ok(valid) => valid,
                Err(e) => {
                    log::warn!("Transaction {} in block {} not verifiable: {}", tx.id, block.hash, e);
                    false
                }
            };
            if !valid {
                return Err(ValidationError::InvalidTransaction(tx.get_id()).into());
            }
        }

        self.validate_pow(block)?;
        Ok(())
    }

    /// Proof-of-work check plus stored-hash consistency
    pub fn validate_pow(&self, block: &Block) -> Result<()> {
        let pow = ProofOfWork::new(block, self.difficulty);
        if !pow.validate() {
            return Err(ValidationError::InvalidProofOfWork(block.hash.to_hex()).into());
        }

        let computed = pow.compute_hash()?;
        if computed != block.hash {
            return Err(ValidationError::HashMismatch {
                stored: block.hash.to_hex(),
                computed: computed.to_hex(),
            }
            .into());
        }
        Ok(())
    }
}
