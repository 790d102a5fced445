// Network node - accept loop and message handlers

use crate::chain::Blockchain;
use crate::config::NodeConfig;
use crate::core::{Block, Hash256, Transaction};
use crate::error::{Error, Result};
use crate::network::{Client, Mempool, Message, PeerSet, VersionMessage};
use crate::storage::UtxoSet;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

/// A gossiping ledger node.
///
/// Cloning is cheap; every clone shares the same chain, UTXO index,
/// mempool and peer set.
#[derive(Clone)]
pub struct Node {
    config: Arc<NodeConfig>,
    chain: Arc<Blockchain>,
    utxo_set: Arc<UtxoSet>,
    mempool: Arc<Mempool>,
    peers: Arc<PeerSet>,
    client: Client,
}

impl Node {
    /// Create a node; non-founding nodes start with the founding node as peer
    pub fn new(config: NodeConfig, chain: Arc<Blockchain>, utxo_set: Arc<UtxoSet>) -> Self {
        let known = if config.is_founding_node() {
            Vec::new()
        } else {
            vec![config.founding_address.clone()]
        };

        Self {
            peers: Arc::new(PeerSet::new(config.node_address.clone(), known)),
            client: Client::new(config.node_address.clone(), config.protocol_version),
            mempool: Arc::new(Mempool::new()),
            config: Arc::new(config),
            chain,
            utxo_set,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn utxo_set(&self) -> &Arc<UtxoSet> {
        &self.utxo_set
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Bind `node_address` and serve until the process stops
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.node_address).await?;
        self.serve(listener).await
    }

    /// Bootstrap, start the miner if configured, then accept connections
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        log::info!(
            "Node listening on {} (height {})",
            self.config.node_address,
            self.chain.best_height()?
        );

        self.bootstrap().await?;

        if self.config.is_miner() {
            tokio::spawn(crate::network::miner::run(self.clone()));
        }

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New connection from {}", addr);

            let node = self.clone();
            tokio::spawn(async move {
                if let Err(e) = node.handle_connection(stream).await {
                    log::error!("Connection from {} failed: {}", addr, e);
                }
            });
        }
    }

    async fn bootstrap(&self) -> Result<()> {
        match self.peers.first() {
            Ok(peer) => {
                log::info!("Bootstrapping from {}", peer);
                self.client.send_version(&peer, self.chain.best_height()?).await;
                self.client.send_get_mempool_txs(&peer).await;
                Ok(())
            }
            Err(Error::NoPeers) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read a full message and dispatch it
    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await?;
        drop(stream);

        let message = Message::deserialize(&data)?;
        self.handle_message(message).await
    }

    pub async fn handle_message(&self, message: Message) -> Result<()> {
        log::debug!(
            "Received {} from {}",
            message.command(),
            message.addr_from().unwrap_or("-")
        );

        match message {
            Message::Version(version) => self.handle_version(version).await,
            Message::Addresses { addresses } => self.handle_addresses(addresses).await,
            Message::BlockCreated {
                addr_from,
                block_hash,
            } => self.handle_block_created(&addr_from, block_hash).await,
            Message::GetBlock { addr_from, hash } => self.handle_get_block(&addr_from, hash).await,
            Message::GetBlockByHeight { addr_from, height } => {
                self.handle_get_block_by_height(&addr_from, height).await
            }
            Message::Block { addr_from, block } => self.handle_block(&addr_from, block).await,
            Message::Tx {
                addr_from,
                transaction,
            } => {
                self.handle_tx(&addr_from, transaction).await;
                Ok(())
            }
            Message::GetMempoolTxs { addr_from } => {
                for tx in self.mempool.txs() {
                    self.client.send_tx(&addr_from, &tx).await;
                }
                Ok(())
            }
        }
    }

    async fn handle_version(&self, version: VersionMessage) -> Result<()> {
        let best_height = self.chain.best_height()?;
        log::info!(
            "Version from {}: height {} (ours {})",
            version.addr_from,
            version.best_height,
            best_height
        );

        self.peers.add(&version.addr_from);

        if best_height < version.best_height {
            self.client.get_next_block(&version.addr_from, best_height).await;
        } else if best_height > version.best_height {
            self.client.send_version(&version.addr_from, best_height).await;
        }
        Ok(())
    }

    async fn handle_addresses(&self, addresses: Vec<String>) -> Result<()> {
        for addr in &addresses {
            self.peers.add(addr);
        }
        log::info!(
            "Received {} addresses, {} known peers",
            addresses.len(),
            self.peers.len()
        );

        let best_height = self.chain.best_height()?;
        for peer in self.peers.all() {
            self.client.send_version(&peer, best_height).await;
        }
        Ok(())
    }

    async fn handle_block_created(&self, addr_from: &str, block_hash: Hash256) -> Result<()> {
        if !self.chain.has_block(&block_hash)? {
            self.client.send_get_block(addr_from, block_hash).await;
        }
        Ok(())
    }

    async fn handle_get_block(&self, addr_from: &str, hash: Hash256) -> Result<()> {
        match self.chain.get_block(&hash) {
            Ok(block) => self.client.send_block(addr_from, &block).await,
            Err(Error::BlockNotFound(_)) => log::debug!("Block {} requested by {} not found", hash, addr_from),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn handle_get_block_by_height(&self, addr_from: &str, height: u64) -> Result<()> {
        match self.chain.get_block_by_height(height) {
            Ok(block) => self.client.send_block(addr_from, &block).await,
            Err(Error::HeightNotFound(_)) => {
                log::debug!("No block at height {} for {}", height, addr_from)
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Validate and append a block received from `addr_from`.
    /// On success the sender gets our new version so catch-up continues.
    /// Catch-up depends on this reply going to the sender, not to ourselves.
    async fn handle_block(&self, addr_from: &str, block: Block) -> Result<()> {
        log::info!(
            "Received block {} (height {}, {} txs) from {}",
            block.hash,
            block.height,
            block.transactions.len(),
            addr_from
        );

        if self.chain.has_block(&block.hash)? {
            return Ok(());
        }

        let utxo_set = self.utxo_set.clone();
        let added = tokio::task::spawn_blocking(move || -> Result<Option<Block>> {
            Ok(utxo_set.add_block(&block)?.then_some(block))
        })
        .await
        .map_err(|e| Error::Message(format!("block task failed: {}", e)))?;

        match added {
            Ok(Some(block)) => {
                for id in block.tx_ids() {
                    self.mempool.delete(&id);
                }
                self.client
                    .send_version(addr_from, self.chain.best_height()?)
                    .await;
            }
            Ok(None) => {}
            Err(Error::Validation(e)) => log::warn!("Dropped block from {}: {}", addr_from, e),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Pool a gossiped transaction and relay it once.
    /// Returns whether it was new.
    pub async fn handle_tx(&self, addr_from: &str, tx: Transaction) -> bool {
        let id = tx.get_id();
        if !self.mempool.add(tx.clone()) {
            log::debug!("Transaction {} already pooled", id);
            return false;
        }

        for peer in self.peers.all() {
            if peer != addr_from {
                self.client.send_tx(&peer, &tx).await;
            }
        }
        true
    }

    /// Verify the pool, mine one block on top of the tip and index it.
    /// Returns `None` when there is nothing valid to mine.
    fn mine_pending_block(&self) -> Result<Option<Block>> {
        let pending = self.mempool.txs();
        if pending.is_empty() {
            log::debug!("Mempool empty");
            return Ok(None);
        }
        log::info!("Mining block with {} pending transactions", pending.len());

        let mut txs = Vec::new();
        for tx in pending {
            match self.chain.verify_transaction(&tx) {
                Ok(true) => txs.push(tx),
                Ok(false) => {
                    log::warn!("Dropping invalid transaction {}", tx.id);
                    self.mempool.delete(&tx.get_id());
                }
                Err(e) => log::warn!("Skipping transaction {}: {}", tx.id, e),
            }
        }

        if txs.is_empty() {
            log::error!("All pending transactions are invalid");
            return Ok(None);
        }

        let miner = self
            .config
            .miner_address
            .as_deref()
            .ok_or_else(|| Error::InvalidAddress("no miner address configured".to_string()))?;
        let reward_to = crate::wallet::Address::parse(miner)?.pub_key_hash()?;
        txs.push(Transaction::coinbase(&reward_to, ""));

        let block = self.utxo_set.mine_block(txs)?;
        for id in block.tx_ids() {
            self.mempool.delete(&id);
        }
        Ok(Some(block))
    }

    /// Mine until the mempool holds nothing minable, announcing each block
    pub async fn mine_pending(&self) -> Result<Vec<Block>> {
        let mut mined = Vec::new();

        loop {
            let node = self.clone();
            let block = tokio::task::spawn_blocking(move || node.mine_pending_block())
                .await
                .map_err(|e| Error::Message(format!("mining task failed: {}", e)))??;

            let Some(block) = block else { break };
            log::info!("New block mined: {}", block.hash);

            for peer in self.peers.all() {
                self.client.send_block_created(&peer, block.hash).await;
            }
            mined.push(block);

            if self.mempool.is_empty() {
                break;
            }
        }

        Ok(mined)
    }
}
