// Persisted, hash-linked chain of blocks

use crate::chain::BlockIterator;
use crate::consensus::{BlockValidator, ProofOfWork, Target, ValidationError};
use crate::core::{Block, Hash256, Transaction};
use crate::error::{Error, Result};
use crate::storage::{BlockchainDB, Storage, Utxo};
use parking_lot::{Mutex, RwLock};
use secp256k1::SecretKey;
use std::collections::{HashMap, HashSet};

/// Coinbase data of the genesis block
pub const GENESIS_DATA: &str = "Genesis data";

/// The ledger: blocks in a sled store plus a cached tip hash.
///
/// Every extension of the chain (`add_block`, `mine_block`) runs under one
/// mutex, so "read tip, decide, write tip" cannot interleave between the
/// network handlers and the miner. The `_with` variants run a hook on the
/// appended block inside that same section; derived indexes use it to stay
/// in chain order.
pub struct Blockchain {
    db: BlockchainDB,
    difficulty: u32,
    last_hash: RwLock<Hash256>,
    extend: Mutex<()>,
}

impl Blockchain {
    /// Create a new chain whose genesis coinbase pays `pub_key_hash`
    pub fn create(storage: &Storage, pub_key_hash: &[u8], difficulty: u32) -> Result<Self> {
        Target::new(difficulty)?;
        if storage.blocks().get_last_hash()?.is_some() {
            return Err(Error::ChainExists);
        }

        let coinbase = Transaction::coinbase(pub_key_hash, GENESIS_DATA);
        let genesis = Self::genesis(coinbase, difficulty)?;
        log::info!("Genesis block created: {}", genesis.hash);
        Self::init_with_genesis(storage, genesis, difficulty)
    }

    /// Seed an empty store with an already mined genesis block
    pub fn init_with_genesis(storage: &Storage, genesis: Block, difficulty: u32) -> Result<Self> {
        Target::new(difficulty)?;
        let db = storage.blocks();
        if db.get_last_hash()?.is_some() {
            return Err(Error::ChainExists);
        }
        BlockValidator::new(difficulty).validate_pow(&genesis)?;

        db.append_genesis(&genesis, difficulty)?;
        Ok(Self {
            db,
            difficulty,
            last_hash: RwLock::new(genesis.hash),
            extend: Mutex::new(()),
        })
    }

    /// Continue an existing chain; `difficulty` must match the one it was created with
    pub fn open(storage: &Storage, difficulty: u32) -> Result<Self> {
        Target::new(difficulty)?;
        let db = storage.blocks();
        let last_hash = db.get_last_hash()?.ok_or(Error::ChainNotFound)?;
        match db.get_difficulty()? {
            Some(stored) if stored != difficulty => {
                return Err(Error::DifficultyMismatch {
                    stored,
                    configured: difficulty,
                });
            }
            Some(_) => {}
            None => log::warn!("Chain has no recorded difficulty, using {}", difficulty),
        }
        Ok(Self {
            db,
            difficulty,
            last_hash: RwLock::new(last_hash),
            extend: Mutex::new(()),
        })
    }

    /// Sort `txs`, run proof of work and return the (unpersisted) block
    pub fn create_block(
        txs: Vec<Transaction>,
        prev_hash: Hash256,
        height: u64,
        difficulty: u32,
    ) -> Result<Block> {
        let mut block = Block::new(txs, prev_hash, height);
        let (nonce, hash) = ProofOfWork::new(&block, difficulty).mine()?;
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    /// Mine the height-0 block holding only `coinbase`
    pub fn genesis(coinbase: Transaction, difficulty: u32) -> Result<Block> {
        Self::create_block(vec![coinbase], Hash256::zero(), 0, difficulty)
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn last_hash(&self) -> Hash256 {
        *self.last_hash.read()
    }

    pub fn last_block(&self) -> Result<Block> {
        self.get_block(&self.last_hash())
    }

    pub fn best_height(&self) -> Result<u64> {
        Ok(self.last_block()?.height)
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Block> {
        self.db
            .get_block(hash)?
            .ok_or_else(|| Error::BlockNotFound(hash.to_hex()))
    }

    pub fn has_block(&self, hash: &Hash256) -> Result<bool> {
        self.db.has_block(hash)
    }

    /// Walk back from the tip looking for `height`
    pub fn get_block_by_height(&self, height: u64) -> Result<Block> {
        for block in self.iter() {
            let block = block?;
            if block.height == height {
                return Ok(block);
            }
        }
        Err(Error::HeightNotFound(height))
    }

    /// Block hashes from tip to genesis
    pub fn block_hashes(&self) -> Result<Vec<Hash256>> {
        self.iter().map(|block| block.map(|b| b.hash)).collect()
    }

    /// Fresh tip-to-genesis walk
    pub fn iter(&self) -> BlockIterator {
        BlockIterator::new(self.db.clone(), self.last_hash())
    }

    /// Check `block` as the successor of the current tip
    pub fn validate_block(&self, block: &Block) -> Result<()> {
        log::debug!("Validating block {}", block.hash);
        let tip = self.last_block()?;
        BlockValidator::new(self.difficulty).validate(block, &tip, |tx| self.verify_transaction(tx))
    }

    /// Validate and append a block received from a peer.
    /// Returns `false` when the block is already stored.
    pub fn add_block(&self, block: &Block) -> Result<bool> {
        self.add_block_with(block, |_| Ok(()))
    }

    /// Like [`Blockchain::add_block`], running `on_append` on the stored
    /// block before any other block can be appended.
    pub fn add_block_with<F>(&self, block: &Block, on_append: F) -> Result<bool>
    where
        F: FnOnce(&Block) -> Result<()>,
    {
        let _extend = self.extend.lock();

        if self.db.has_block(&block.hash)? {
            log::info!("Block {} (height {}) already exists", block.hash, block.height);
            return Ok(false);
        }

        if let Err(e) = self.validate_block(block) {
            log::warn!("Rejected block {}: {}", block.hash, e);
            return Err(e);
        }

        self.db.append_block(block)?;
        *self.last_hash.write() = block.hash;

        log::info!("Added block {} at height {}", block.hash, block.height);
        on_append(block)?;
        Ok(true)
    }

    /// Verify `txs`, mine them on top of the tip and persist the new block
    pub fn mine_block(&self, txs: Vec<Transaction>) -> Result<Block> {
        self.mine_block_with(txs, |_| Ok(()))
    }

    /// Like [`Blockchain::mine_block`], running `on_append` on the new block
    /// before any other block can be appended.
    pub fn mine_block_with<F>(&self, txs: Vec<Transaction>, on_append: F) -> Result<Block>
    where
        F: FnOnce(&Block) -> Result<()>,
    {
        for tx in &txs {
            if !self.verify_transaction(tx)? {
                return Err(ValidationError::InvalidTransaction(tx.get_id()).into());
            }
        }

        let _extend = self.extend.lock();
        let tip = self.last_block()?;
        let block = Self::create_block(txs, tip.hash, tip.height + 1, self.difficulty)?;

        self.db.append_block(&block)?;
        *self.last_hash.write() = block.hash;

        log::info!("Mined block {} at height {}", block.hash, block.height);
        on_append(&block)?;
        Ok(block)
    }

    /// Run `f` while no block can be appended
    pub fn with_tip_held<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let _extend = self.extend.lock();
        f(self)
    }

    /// Scan from the tip for a confirmed transaction
    pub fn find_transaction(&self, id: &Hash256) -> Result<Transaction> {
        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == *id) {
                return Ok(tx);
            }
        }
        Err(Error::TransactionNotFound(id.to_hex()))
    }

    /// Every unspent output on the chain, grouped by transaction id
    pub fn find_utxo(&self) -> Result<HashMap<Hash256, Vec<Utxo>>> {
        let blocks: Vec<Block> = self.iter().collect::<Result<_>>()?;

        let mut spent: HashSet<(Hash256, u32)> = HashSet::new();
        for tx in blocks.iter().flat_map(|b| &b.transactions) {
            if !tx.is_coinbase() {
                spent.extend(tx.inputs.iter().map(|input| (input.prev_tx_id, input.out)));
            }
        }

        let mut utxos: HashMap<Hash256, Vec<Utxo>> = HashMap::new();
        for tx in blocks.iter().flat_map(|b| &b.transactions) {
            for (index, output) in tx.outputs.iter().enumerate() {
                let index = index as u32;
                if !spent.contains(&(tx.id, index)) {
                    utxos
                        .entry(tx.id)
                        .or_default()
                        .push(Utxo::new(index, output.clone()));
                }
            }
        }

        Ok(utxos)
    }

    fn prev_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>> {
        let mut prev_txs = HashMap::new();
        for input in &tx.inputs {
            if !prev_txs.contains_key(&input.prev_tx_id) {
                let prev = self.find_transaction(&input.prev_tx_id)?;
                prev_txs.insert(prev.id, prev);
            }
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction(&self, tx: &mut Transaction, secret_key: &SecretKey) -> Result<()> {
        let prev_txs = self.prev_transactions(tx)?;
        tx.sign(secret_key, &prev_txs)
    }

    /// Check a transaction's signatures against the outputs it spends
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.prev_transactions(tx)?;
        let valid = tx.verify(&prev_txs)?;
        log::debug!("Transaction {} verification result: {}", tx.id, valid);
        Ok(valid)
    }
}
