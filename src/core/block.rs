// Block data structures

use super::serialize::{read_hash, read_i64, read_u64, read_varint, write_varint};
use crate::core::{Hash256, MerkleTree, Serializable, Transaction, sha256, sort_by_timestamp};
use crate::error::Result;
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};

/// Block - hash-linked batch of transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Creation time (Unix seconds)
    pub timestamp: i64,
    /// Proof-of-work result
    pub hash: Hash256,
    /// Always kept sorted by transaction timestamp
    pub transactions: Vec<Transaction>,
    /// Zero for the genesis block
    pub prev_hash: Hash256,
    pub nonce: u64,
    pub height: u64,
}

impl Block {
    /// Unmined block skeleton; `hash` and `nonce` are filled in by mining
    pub fn new(transactions: Vec<Transaction>, prev_hash: Hash256, height: u64) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let mut block = Self {
            timestamp,
            hash: Hash256::zero(),
            transactions,
            prev_hash,
            nonce: 0,
            height,
        };
        block.sort_transactions();
        block
    }

    pub fn sort_transactions(&mut self) {
        sort_by_timestamp(&mut self.transactions);
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }

    /// Hex ids of the contained transactions, in block order
    pub fn tx_ids(&self) -> Vec<String> {
        self.transactions.iter().map(Transaction::get_id).collect()
    }

    /// Merkle root over the raw binary-encoded transactions
    pub fn hash_transactions(&self) -> Result<Hash256> {
        let leaves = self.transactions.iter().map(|tx| tx.serialize()).collect();
        Ok(MerkleTree::new(leaves)?.root())
    }

    /// Merkle root over SHA-256(JSON) of each transaction; the proof-of-work input
    pub fn json_hash_transactions(&self) -> Result<Hash256> {
        let mut leaves = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            leaves.push(sha256(&tx.json_serialize()?).as_bytes().to_vec());
        }
        Ok(MerkleTree::new(leaves)?.root())
    }
}

impl Serializable for Block {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());

        write_varint(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.serialize());
        }

        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let timestamp = read_i64(&mut cursor)?;
        let hash = read_hash(&mut cursor)?;

        let tx_count = read_varint(&mut cursor)? as usize;
        let mut transactions = Vec::new();
        for _ in 0..tx_count {
            transactions.push(Transaction::from_reader(&mut cursor)?);
        }

        let prev_hash = read_hash(&mut cursor)?;
        let nonce = read_u64(&mut cursor)?;
        let height = read_u64(&mut cursor)?;

        let mut block = Self {
            timestamp,
            hash,
            transactions,
            prev_hash,
            nonce,
            height,
        };
        block.sort_transactions();
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn coinbase_at(timestamp: i64, data: &str) -> Transaction {
        let mut tx = Transaction::coinbase(&[7; 20], data);
        tx.timestamp = timestamp;
        tx
    }

    #[test]
    fn test_new_block_sorts_transactions() {
        let block = Block::new(
            vec![coinbase_at(30, "c"), coinbase_at(10, "a"), coinbase_at(20, "b")],
            Hash256::zero(),
            0,
        );
        let stamps: Vec<i64> = block.transactions.iter().map(|tx| tx.timestamp).collect();
        assert_eq!(stamps, vec![10, 20, 30]);
        assert!(block.is_genesis());
    }

    #[test]
    fn test_block_serialization() {
        let mut block = Block::new(vec![coinbase_at(1, "a"), coinbase_at(2, "b")], Hash256::new([3; 32]), 4);
        block.hash = Hash256::new([5; 32]);
        block.nonce = 99;

        let decoded = Block::deserialize(&block.serialize()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_truncated_block_is_error() {
        let block = Block::new(vec![coinbase_at(1, "a")], Hash256::zero(), 0);
        let mut bytes = block.serialize();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(Block::deserialize(&bytes), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_two_transaction_hash_schemes_differ() {
        let block = Block::new(vec![coinbase_at(1, "a")], Hash256::zero(), 0);
        let raw = block.hash_transactions().unwrap();
        let json = block.json_hash_transactions().unwrap();
        assert_ne!(raw, json);
        assert_eq!(raw, block.hash_transactions().unwrap());
        assert_eq!(json, block.json_hash_transactions().unwrap());
    }

    #[test]
    fn test_empty_block_has_no_merkle_root() {
        let block = Block::new(vec![], Hash256::zero(), 0);
        assert!(block.hash_transactions().is_err());
        assert!(block.json_hash_transactions().is_err());
    }
}
