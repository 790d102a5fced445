// Binary Merkle tree over an ordered list of leaf contents

use crate::core::{Hash256, sha256};
use crate::error::{Error, Result};

/// Merkle tree committing to a block's transaction set.
///
/// Leaves are taken as-is (they are already content hashes or serialized
/// transactions). Each parent is SHA-256 of the concatenation of its two
/// children; an odd node at any level is paired with itself, so a single
/// leaf yields `sha256(leaf || leaf)`.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    leaves: Vec<Vec<u8>>,
    root: Hash256,
}

impl MerkleTree {
    pub fn new(leaves: Vec<Vec<u8>>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::EmptyMerkleTree);
        }

        let mut level: Vec<Vec<u8>> = leaves.clone();
        loop {
            let mut next_level = Vec::with_capacity(level.len().div_ceil(2));

            for chunk in level.chunks(2) {
                let left = &chunk[0];
                let right = chunk.get(1).unwrap_or(left);

                let mut combined = Vec::with_capacity(left.len() + right.len());
                combined.extend_from_slice(left);
                combined.extend_from_slice(right);
                next_level.push(sha256(&combined).as_bytes().to_vec());
            }

            if next_level.len() == 1 {
                let root = Hash256::from_slice(&next_level[0])?;
                return Ok(Self { leaves, root });
            }
            level = next_level;
        }
    }

    pub fn root(&self) -> Hash256 {
        self.root
    }

    /// Whether `content` is one of the leaves (byte comparison)
    pub fn contains(&self, content: &[u8]) -> bool {
        self.leaves.iter().any(|leaf| leaf.as_slice() == content)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut combined = left.to_vec();
        combined.extend_from_slice(right);
        sha256(&combined).as_bytes().to_vec()
    }

    #[test]
    fn test_empty_tree_fails() {
        assert!(matches!(MerkleTree::new(vec![]), Err(Error::EmptyMerkleTree)));
    }

    #[test]
    fn test_single_leaf_is_paired_with_itself() {
        let tree = MerkleTree::new(vec![b"a".to_vec()]).unwrap();
        assert_eq!(tree.root().as_bytes().to_vec(), pair(b"a", b"a"));
    }

    #[test]
    fn test_three_leaves() {
        let tree = MerkleTree::new(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]).unwrap();
        let ab = pair(b"a", b"b");
        let cc = pair(b"c", b"c");
        assert_eq!(tree.root().as_bytes().to_vec(), pair(&ab, &cc));
        assert_eq!(tree.leaf_count(), 3);
        assert!(tree.contains(b"b"));
        assert!(!tree.contains(b"d"));
    }

    #[test]
    fn test_leaf_order_matters() {
        let a = MerkleTree::new(vec![b"a".to_vec(), b"b".to_vec()]).unwrap();
        let b = MerkleTree::new(vec![b"b".to_vec(), b"a".to_vec()]).unwrap();
        assert_ne!(a.root(), b.root());
    }
}
