// Key management and addresses

use crate::core::{hash160, hash256};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Version byte prefixed to the public key hash
pub const ADDRESS_VERSION: u8 = 0x00;

/// Bytes of double SHA-256 appended as checksum
pub const CHECKSUM_LENGTH: usize = 4;

const PUB_KEY_HASH_LENGTH: usize = 20;

/// Base58Check address: version ‖ pub key hash ‖ checksum
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create address from a 20-byte public key hash
    pub fn from_pub_key_hash(pub_key_hash: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + CHECKSUM_LENGTH);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(pub_key_hash);
        let sum = checksum(&payload);
        payload.extend_from_slice(&sum);
        Self(bs58::encode(payload).into_string())
    }

    /// Parse and validate an address string
    pub fn parse(s: &str) -> Result<Self> {
        let address = Self(s.to_string());
        address.pub_key_hash()?;
        Ok(address)
    }

    /// Whether `s` decodes and its checksum matches
    pub fn validate(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to the 20-byte public key hash
    pub fn pub_key_hash(&self) -> Result<Vec<u8>> {
        let invalid = || Error::InvalidAddress(self.0.clone());

        let bytes = bs58::decode(&self.0).into_vec().map_err(|_| invalid())?;
        if bytes.len() != 1 + PUB_KEY_HASH_LENGTH + CHECKSUM_LENGTH {
            return Err(invalid());
        }

        let (payload, sum) = bytes.split_at(bytes.len() - CHECKSUM_LENGTH);
        if payload[0] != ADDRESS_VERSION || checksum(payload) != sum {
            return Err(invalid());
        }

        Ok(payload[1..].to_vec())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let mut sum = [0u8; CHECKSUM_LENGTH];
    sum.copy_from_slice(&hash256(payload).as_bytes()[..CHECKSUM_LENGTH]);
    sum
}

/// Key pair
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::new(&mut OsRng);
        let public_key = secret_key.public_key(&secp);
        Self {
            secret_key,
            public_key,
        }
    }

    fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(bytes)?;
        let public_key = secret_key.public_key(&secp);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Compressed public key bytes
    pub fn pub_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    pub fn pub_key_hash(&self) -> Vec<u8> {
        hash160(&self.pub_key_bytes()).to_vec()
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key_hash(&self.pub_key_hash())
    }
}

/// On-disk form: address -> hex secret key
#[derive(Default, Serialize, Deserialize)]
struct WalletsFile {
    keys: BTreeMap<Address, String>,
}

/// Persisted collection of key pairs, one file per node
pub struct Wallets {
    path: PathBuf,
    keys: BTreeMap<Address, KeyPair>,
}

impl Wallets {
    /// Load the wallets file, or start empty if it does not exist yet
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut keys = BTreeMap::new();

        if path.exists() {
            let json = fs::read_to_string(&path)?;
            let file: WalletsFile = serde_json::from_str(&json)?;
            for (address, secret) in file.keys {
                let bytes = hex::decode(&secret)
                    .map_err(|e| Error::Serialization(format!("wallet key: {}", e)))?;
                keys.insert(address, KeyPair::from_secret_bytes(&bytes)?);
            }
            log::debug!("Loaded {} wallets from {}", keys.len(), path.display());
        }

        Ok(Self { path, keys })
    }

    pub fn save(&self) -> Result<()> {
        let file = WalletsFile {
            keys: self
                .keys
                .iter()
                .map(|(address, kp)| (address.clone(), hex::encode(kp.secret_key.secret_bytes())))
                .collect(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Generate a key pair and return its address (call `save` to persist)
    pub fn create_wallet(&mut self) -> Address {
        let keypair = KeyPair::generate();
        let address = keypair.address();
        self.keys.insert(address.clone(), keypair);
        log::info!("New wallet created: {}", address);
        address
    }

    pub fn get(&self, address: &Address) -> Result<&KeyPair> {
        self.keys
            .get(address)
            .ok_or_else(|| Error::UnknownWallet(address.to_string()))
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keys.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp = KeyPair::generate();

        assert_eq!(kp.pub_key_bytes().len(), 33); // Compressed pubkey
        assert_eq!(kp.pub_key_hash().len(), 20);
    }

    #[test]
    fn test_address_conversion() {
        let hash = [0x12; 20];
        let addr = Address::from_pub_key_hash(&hash);

        assert!(Address::validate(addr.as_str()));
        assert_eq!(addr.pub_key_hash().unwrap(), hash.to_vec());
    }

    #[test]
    fn test_address_rejects_bad_checksum() {
        let addr = KeyPair::generate().address();
        let mut bytes = bs58::decode(addr.as_str()).into_vec().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = bs58::encode(bytes).into_string();

        assert!(!Address::validate(&tampered));
        assert!(!Address::validate("not-an-address"));
        assert!(matches!(Address::parse("0OIl"), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_wallets_persist() {
        let dir = std::env::temp_dir().join(format!("wallets-test-{}", hex::encode(rand::random::<[u8; 8]>())));
        let path = dir.join("wallets_3000.json");

        let mut wallets = Wallets::load(&path).unwrap();
        assert!(wallets.is_empty());

        let addr1 = wallets.create_wallet();
        let addr2 = wallets.create_wallet();
        wallets.save().unwrap();

        let reloaded = Wallets::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get(&addr1).unwrap().pub_key_hash(),
            wallets.get(&addr1).unwrap().pub_key_hash()
        );
        assert!(reloaded.addresses().contains(&addr2));

        let missing = KeyPair::generate().address();
        assert!(matches!(reloaded.get(&missing), Err(Error::UnknownWallet(_))));

        fs::remove_dir_all(dir).unwrap();
    }
}
