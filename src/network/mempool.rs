// Pending transaction pool

use crate::core::Transaction;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Unconfirmed transactions keyed by hex id.
/// Every accessor goes through the same lock.
#[derive(Default)]
pub struct Mempool {
    pool: RwLock<HashMap<String, Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if absent; returns whether the transaction was new
    pub fn add(&self, tx: Transaction) -> bool {
        let mut pool = self.pool.write();
        let id = tx.get_id();
        if pool.contains_key(&id) {
            return false;
        }
        pool.insert(id.clone(), tx);
        log::info!("Transaction {} added to mempool ({} pending)", id, pool.len());
        true
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.pool.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pool.read().contains_key(id)
    }

    pub fn delete(&self, id: &str) -> Option<Transaction> {
        self.pool.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.pool.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.read().is_empty()
    }

    /// Snapshot of every pending transaction
    pub fn txs(&self) -> Vec<Transaction> {
        self.pool.read().values().cloned().collect()
    }

    pub fn tx_ids(&self) -> Vec<String> {
        self.pool.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mempool = Mempool::new();
        let tx = Transaction::coinbase(&[1; 20], "");

        assert!(mempool.add(tx.clone()));
        assert!(!mempool.add(tx.clone()));
        assert_eq!(mempool.len(), 1);
        assert_eq!(mempool.get(&tx.get_id()), Some(tx));
    }

    #[test]
    fn test_delete_and_snapshot() {
        let mempool = Mempool::new();
        let a = Transaction::coinbase(&[1; 20], "");
        let b = Transaction::coinbase(&[2; 20], "");
        mempool.add(a.clone());
        mempool.add(b.clone());

        let mut ids = mempool.tx_ids();
        ids.sort();
        let mut expected = vec![a.get_id(), b.get_id()];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(mempool.txs().len(), 2);

        assert_eq!(mempool.delete(&a.get_id()), Some(a.clone()));
        assert!(mempool.delete(&a.get_id()).is_none());
        assert!(!mempool.contains(&a.get_id()));
        assert!(mempool.contains(&b.get_id()));
    }

    #[test]
    fn test_concurrent_adds() {
        let mempool = std::sync::Arc::new(Mempool::new());
        let tx = Transaction::coinbase(&[3; 20], "");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mempool = mempool.clone();
                let tx = tx.clone();
                std::thread::spawn(move || mempool.add(tx))
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&added| added)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(mempool.len(), 1);
    }
}
