// Hashing utilities

use crate::core::Hash256;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256, used for transaction ids, block hashes and Merkle nodes
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut result = [0u8; 32];
    result.copy_from_slice(&Sha256::digest(data));
    Hash256::new(result)
}

/// SHA256(SHA256(data)), used for address checksums
pub fn hash256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&Sha256::digest(first));
    Hash256::new(result)
}

/// RIPEMD160(SHA256(data)) - public key hash locking an output
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash256_differs_from_single() {
        let data = b"hello world";
        assert_ne!(hash256(data), sha256(data));
        assert_eq!(hash256(data), sha256(sha256(data).as_bytes()));
    }

    #[test]
    fn test_hash160() {
        let hash = hash160(b"test data");
        assert_eq!(hash.len(), 20);
        assert_eq!(hash, hash160(b"test data"));
    }
}
