// Proof of Work implementation

use crate::core::{Block, Hash256, sha256};
use crate::error::{Error, Result};
use std::ops::RangeInclusive;
use std::time::Instant;

/// Default number of leading zero bits a block hash must have
pub const DIFFICULTY: u32 = 18;

/// Difficulties a target can be built for
pub const DIFFICULTY_RANGE: RangeInclusive<u32> = 1..=255;

/// Difficulty target: `1 << (256 - difficulty)` as a big-endian 256-bit number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub difficulty: u32,
    bytes: [u8; 32],
}

impl Target {
    /// Target for `difficulty`, rejecting values outside [`DIFFICULTY_RANGE`]
    pub fn new(difficulty: u32) -> Result<Self> {
        if !DIFFICULTY_RANGE.contains(&difficulty) {
            return Err(Error::InvalidDifficulty(difficulty));
        }
        Ok(Self::from_difficulty(difficulty))
    }

    /// Unchecked form for difficulties a chain has already accepted;
    /// out-of-range values are clamped into [`DIFFICULTY_RANGE`]
    pub fn from_difficulty(difficulty: u32) -> Self {
        let difficulty = difficulty.clamp(*DIFFICULTY_RANGE.start(), *DIFFICULTY_RANGE.end());
        let bit = 256 - difficulty as usize;
        let mut bytes = [0u8; 32];
        bytes[31 - bit / 8] = 1 << (bit % 8);
        Self { difficulty, bytes }
    }

    pub fn to_hash256(&self) -> Hash256 {
        Hash256::new(self.bytes)
    }

    /// hash < target, both read as big-endian unsigned integers
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        hash.as_bytes() < &self.bytes
    }
}

/// Proof of work over one block
pub struct ProofOfWork<'a> {
    block: &'a Block,
    pub target: Target,
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a Block, difficulty: u32) -> Self {
        Self {
            block,
            target: Target::from_difficulty(difficulty),
        }
    }

    /// prev_hash || json merkle root || nonce (8 bytes BE) || difficulty (8 bytes BE)
    pub fn challenge(&self, nonce: u64) -> Result<Vec<u8>> {
        let root = self.block.json_hash_transactions()?;
        Ok(self.challenge_with_root(&root, nonce))
    }

    fn challenge_with_root(&self, root: &Hash256, nonce: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + 32 + 16);
        data.extend_from_slice(self.block.prev_hash.as_bytes());
        data.extend_from_slice(root.as_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data.extend_from_slice(&(self.target.difficulty as u64).to_be_bytes());
        data
    }

    /// Search nonces from zero until the hash falls below the target
    pub fn mine(&self) -> Result<(u64, Hash256)> {
        let start_time = Instant::now();
        // The transaction set is fixed for the whole search
        let root = self.block.json_hash_transactions()?;

        let mut nonce = 0u64;
        loop {
            let hash = sha256(&self.challenge_with_root(&root, nonce));
            if self.target.is_met_by(&hash) {
                log::debug!(
                    "Found nonce {} after {:?} for block at height {}",
                    nonce,
                    start_time.elapsed(),
                    self.block.height
                );
                return Ok((nonce, hash));
            }

            nonce += 1;
            if nonce % 1_000_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    nonce,
                    nonce as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }
    }

    /// Hash of the challenge for the block's stored nonce
    pub fn compute_hash(&self) -> Result<Hash256> {
        Ok(sha256(&self.challenge(self.block.nonce)?))
    }

    /// Whether the stored nonce satisfies the target
    pub fn validate(&self) -> bool {
        match self.compute_hash() {
            Ok(hash) => self.target.is_met_by(&hash),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    fn block() -> Block {
        Block::new(vec![Transaction::coinbase(&[1; 20], "pow")], Hash256::zero(), 0)
    }

    #[test]
    fn test_target_bit_position() {
        let target = Target::from_difficulty(8);
        let bytes = target.to_hash256();
        assert_eq!(bytes.as_bytes()[0], 1);
        assert!(bytes.as_bytes()[1..].iter().all(|b| *b == 0));

        let target = Target::from_difficulty(18);
        assert_eq!(target.to_hash256().as_bytes()[2], 0x40);
    }

    #[test]
    fn test_target_rejects_out_of_range_difficulty() {
        assert!(matches!(Target::new(0), Err(Error::InvalidDifficulty(0))));
        assert!(matches!(Target::new(256), Err(Error::InvalidDifficulty(256))));
        assert_eq!(Target::new(8).unwrap(), Target::from_difficulty(8));
    }

    #[test]
    fn test_target_comparison() {
        let target = Target::from_difficulty(8);
        assert!(target.is_met_by(&Hash256::zero()));
        assert!(!target.is_met_by(&Hash256::new([0xff; 32])));
        // Equal to the target is not below it
        assert!(!target.is_met_by(&target.to_hash256()));
    }

    #[test]
    fn test_mine_then_validate() {
        let mut block = block();
        let (nonce, hash) = ProofOfWork::new(&block, 8).mine().unwrap();
        block.nonce = nonce;
        block.hash = hash;

        let pow = ProofOfWork::new(&block, 8);
        assert!(pow.validate());
        assert_eq!(pow.compute_hash().unwrap(), block.hash);
    }

    #[test]
    fn test_challenge_layout() {
        let block = block();
        let pow = ProofOfWork::new(&block, 8);
        let data = pow.challenge(258).unwrap();
        assert_eq!(data.len(), 80);
        assert_eq!(&data[64..72], &258u64.to_be_bytes());
        assert_eq!(&data[72..80], &8u64.to_be_bytes());
        assert_eq!(&data[32..64], block.json_hash_transactions().unwrap().as_bytes());
    }

    #[test]
    fn test_wrong_nonce_fails_at_high_difficulty() {
        let mut block = block();
        let (nonce, _) = ProofOfWork::new(&block, 8).mine().unwrap();
        block.nonce = nonce;
        // A nonce found for difficulty 8 almost never satisfies 40 bits
        assert!(!ProofOfWork::new(&block, 40).validate());
    }
}
