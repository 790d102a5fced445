// Known peer addresses

use crate::error::{Error, Result};
use parking_lot::RwLock;

/// Insertion-ordered set of peer addresses, never containing the host itself
pub struct PeerSet {
    host: String,
    peers: RwLock<Vec<String>>,
}

impl PeerSet {
    pub fn new(host: impl Into<String>, known: impl IntoIterator<Item = String>) -> Self {
        let set = Self {
            host: host.into(),
            peers: RwLock::new(Vec::new()),
        };
        for peer in known {
            set.add(&peer);
        }
        set
    }

    /// Returns whether the address was newly added
    pub fn add(&self, addr: &str) -> bool {
        if addr == self.host {
            return false;
        }

        let mut peers = self.peers.write();
        if peers.iter().any(|p| p == addr) {
            return false;
        }
        peers.push(addr.to_string());
        log::info!("Adding new peer {}", addr);
        true
    }

    pub fn delete(&self, addr: &str) -> bool {
        let mut peers = self.peers.write();
        match peers.iter().position(|p| p == addr) {
            Some(index) => {
                peers.remove(index);
                log::info!("Deleted peer {}", addr);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.peers.read().iter().any(|p| p == addr)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Snapshot in insertion order
    pub fn all(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    /// Bootstrap peer
    pub fn first(&self) -> Result<String> {
        self.peers.read().first().cloned().ok_or(Error::NoPeers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excludes_host_and_duplicates() {
        let peers = PeerSet::new(
            "localhost:3001",
            vec!["localhost:3000".to_string(), "localhost:3001".to_string()],
        );

        assert_eq!(peers.all(), vec!["localhost:3000"]);
        assert!(!peers.add("localhost:3001"));
        assert!(!peers.add("localhost:3000"));
        assert!(peers.add("localhost:3002"));
        assert_eq!(peers.all(), vec!["localhost:3000", "localhost:3002"]);
        assert_eq!(peers.first().unwrap(), "localhost:3000");
    }

    #[test]
    fn test_delete_and_empty() {
        let peers = PeerSet::new("localhost:3000", Vec::new());
        assert!(matches!(peers.first(), Err(Error::NoPeers)));
        assert!(peers.is_empty());

        peers.add("localhost:3005");
        assert!(peers.contains("localhost:3005"));
        assert!(peers.delete("localhost:3005"));
        assert!(!peers.delete("localhost:3005"));
        assert_eq!(peers.len(), 0);
    }
}
