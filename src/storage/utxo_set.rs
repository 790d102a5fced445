// UTXO (Unspent Transaction Output) index

use crate::chain::Blockchain;
use crate::core::{Block, Hash256, Transaction, TxOutput, read_u32, read_varint, write_varint};
use crate::error::Result;
use crate::storage::Storage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

/// An unspent output together with its position in the owning transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub index: u32,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(index: u32, output: TxOutput) -> Self {
        Self { index, output }
    }
}

/// Derived index: transaction id -> its currently unspent outputs.
///
/// The chain is the source of truth; the index can always be rebuilt from
/// it with [`UtxoSet::reindex`]. Writers hold the lock exclusively so queries
/// never see a half-written index.
pub struct UtxoSet {
    tree: sled::Tree,
    chain: Arc<Blockchain>,
    lock: RwLock<()>,
}

impl UtxoSet {
    pub fn new(storage: &Storage, chain: Arc<Blockchain>) -> Result<Self> {
        Ok(Self {
            tree: storage.utxo_tree()?,
            chain,
            lock: RwLock::new(()),
        })
    }

    /// Discard the index and rebuild it from a full chain scan.
    /// No block is appended while the rebuild runs.
    pub fn reindex(&self) -> Result<()> {
        self.chain.with_tip_held(|chain| {
            let utxos = chain.find_utxo()?;

            let _guard = self.lock.write();
            self.tree.clear()?;

            let mut batch = sled::Batch::default();
            for (txid, outputs) in &utxos {
                batch.insert(txid.as_bytes().as_slice(), encode(outputs));
            }
            self.tree.apply_batch(batch)?;

            log::info!("UTXO index rebuilt: {} transactions", utxos.len());
            Ok(())
        })
    }

    /// Append a block received from a peer and index it in the same step
    pub fn add_block(&self, block: &Block) -> Result<bool> {
        self.chain.add_block_with(block, |block| self.update(block))
    }

    /// Mine `txs` into a new block and index it in the same step
    pub fn mine_block(&self, txs: Vec<Transaction>) -> Result<Block> {
        self.chain.mine_block_with(txs, |block| self.update(block))
    }

    /// Apply one freshly appended block: add its outputs, drop what it spends.
    /// Produces the same index as a full reindex provided blocks are applied
    /// in chain order, which [`UtxoSet::add_block`] and [`UtxoSet::mine_block`]
    /// guarantee.
    pub fn update(&self, block: &Block) -> Result<()> {
        let _guard = self.lock.write();
        let mut touched: HashMap<Hash256, Vec<Utxo>> = HashMap::new();

        for tx in &block.transactions {
            let outputs = tx
                .outputs
                .iter()
                .enumerate()
                .map(|(index, output)| Utxo::new(index as u32, output.clone()))
                .collect();
            touched.insert(tx.id, outputs);
        }

        for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
            for input in &tx.inputs {
                if !touched.contains_key(&input.prev_tx_id) {
                    let current = self.load(&input.prev_tx_id)?;
                    touched.insert(input.prev_tx_id, current);
                }
                if let Some(outputs) = touched.get_mut(&input.prev_tx_id) {
                    outputs.retain(|utxo| utxo.index != input.out);
                }
            }
        }

        let mut batch = sled::Batch::default();
        for (txid, outputs) in &touched {
            if outputs.is_empty() {
                batch.remove(txid.as_bytes().as_slice());
            } else {
                batch.insert(txid.as_bytes().as_slice(), encode(outputs));
            }
        }
        self.tree.apply_batch(batch)?;

        log::debug!("UTXO index updated with block {}", block.hash);
        Ok(())
    }

    /// All unspent outputs locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>> {
        let _guard = self.lock.read();
        let mut found = Vec::new();

        for item in self.tree.iter() {
            let (_, value) = item?;
            for utxo in decode(&value)? {
                if utxo.output.is_locked_with_key(pub_key_hash) {
                    found.push(utxo.output);
                }
            }
        }

        Ok(found)
    }

    /// Greedily collect outputs for `pub_key_hash` until `amount` is covered.
    ///
    /// Returns the accumulated value and the output indices used per
    /// transaction; the caller decides whether the total is sufficient.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<Hash256, Vec<u32>>)> {
        let _guard = self.lock.read();
        let mut accumulated = 0u64;
        let mut unspent: HashMap<Hash256, Vec<u32>> = HashMap::new();

        'scan: for item in self.tree.iter() {
            let (key, value) = item?;
            let txid = Hash256::from_slice(&key)?;

            for utxo in decode(&value)? {
                if accumulated >= amount {
                    break 'scan;
                }
                if utxo.output.is_locked_with_key(pub_key_hash) {
                    accumulated = accumulated.saturating_add(utxo.output.value);
                    unspent.entry(txid).or_default().push(utxo.index);
                }
            }
        }

        Ok((accumulated, unspent))
    }

    pub fn balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .fold(0u64, |total, output| total.saturating_add(output.value)))
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<usize> {
        let _guard = self.lock.read();
        Ok(self.tree.len())
    }

    /// Full index contents, ordered by transaction id
    pub fn entries(&self) -> Result<Vec<(Hash256, Vec<Utxo>)>> {
        let _guard = self.lock.read();
        let mut entries = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            entries.push((Hash256::from_slice(&key)?, decode(&value)?));
        }
        Ok(entries)
    }

    fn load(&self, txid: &Hash256) -> Result<Vec<Utxo>> {
        match self.tree.get(txid.as_bytes())? {
            Some(value) => decode(&value),
            None => Ok(Vec::new()),
        }
    }
}

fn encode(utxos: &[Utxo]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, utxos.len() as u64);
    for utxo in utxos {
        buf.extend_from_slice(&utxo.index.to_le_bytes());
        utxo.output.write(&mut buf);
    }
    buf
}

fn decode(data: &[u8]) -> Result<Vec<Utxo>> {
    let mut cursor = Cursor::new(data);
    let count = read_varint(&mut cursor)? as usize;
    let mut utxos = Vec::new();
    for _ in 0..count {
        let index = read_u32(&mut cursor)?;
        let output = TxOutput::read(&mut cursor)?;
        utxos.push(Utxo::new(index, output));
    }
    Ok(utxos)
}
