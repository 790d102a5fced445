// CLI commands

use crate::chain::Blockchain;
use crate::config::{DEFAULT_DATA_DIR, NodeConfig};
use crate::consensus::{DIFFICULTY, ProofOfWork};
use crate::core::Transaction;
use crate::error::{Error, Result};
use crate::network::{Client, Message, Node};
use crate::storage::{Storage, UtxoSet};
use crate::wallet::{Address, TransactionBuilder, Wallets};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "utxo-gossip")]
#[command(about = "UTXO ledger node with a gossiping P2P network", long_about = None)]
pub struct Cli {
    /// Node id; also the port the node listens on
    #[arg(long, env = "NODE_ID", global = true, default_value = "3000")]
    pub node_id: String,

    /// Directory holding chain databases and wallet files
    #[arg(long, env = "DATA_DIR", global = true, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Leading zero bits required of every block hash; must match the chain's
    #[arg(
        long,
        env = "DIFFICULTY",
        global = true,
        default_value_t = DIFFICULTY,
        value_parser = clap::value_parser!(u32).range(1..=255)
    )]
    pub difficulty: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a blockchain and send the genesis reward to ADDRESS
    CreateChain {
        #[arg(long)]
        address: String,
    },

    /// Get the balance of an address
    Balance {
        #[arg(long)]
        address: String,
    },

    /// Send coins to an address
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        /// Mine the transaction locally instead of sending it to the founding node
        #[arg(short, long)]
        mine: bool,
    },

    /// Start a node; --miner enables mining with rewards to the given address
    Start {
        #[arg(short, long)]
        miner: Option<String>,
    },

    /// Print all blocks from tip to genesis
    Print,

    /// Rebuild the UTXO index
    Reindex,

    /// Create a new wallet
    CreateWallet,

    /// List wallet addresses
    Addresses,
}

/// CLI handler
pub struct CliHandler {
    config: NodeConfig,
}

impl CliHandler {
    pub fn new(cli: &Cli) -> Self {
        let config = NodeConfig::new(cli.node_id.clone())
            .with_data_dir(cli.data_dir.clone())
            .with_difficulty(cli.difficulty);
        Self { config }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Handle CLI command
    pub async fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::CreateChain { address } => self.create_chain(&address),
            Commands::Balance { address } => self.balance(&address),
            Commands::Send {
                from,
                to,
                amount,
                mine,
            } => self.send(&from, &to, amount, mine).await,
            Commands::Start { miner } => self.start(miner).await,
            Commands::Print => self.print(),
            Commands::Reindex => self.reindex(),
            Commands::CreateWallet => self.create_wallet(),
            Commands::Addresses => self.addresses(),
        }
    }

    fn storage(&self) -> Result<Storage> {
        Storage::open(self.config.db_path())
    }

    /// Open the chain and its UTXO index
    fn open_ledger(&self) -> Result<(Storage, Arc<Blockchain>, Arc<UtxoSet>)> {
        if !Storage::exists(self.config.db_path()) {
            return Err(Error::ChainNotFound);
        }
        let storage = self.storage()?;
        let chain = Arc::new(Blockchain::open(&storage, self.config.difficulty)?);
        let utxo_set = Arc::new(UtxoSet::new(&storage, chain.clone())?);
        Ok((storage, chain, utxo_set))
    }

    fn create_chain(&self, address: &str) -> Result<()> {
        let address = Address::parse(address)?;
        let storage = self.storage()?;

        let chain = Arc::new(Blockchain::create(
            &storage,
            &address.pub_key_hash()?,
            self.config.difficulty,
        )?);
        UtxoSet::new(&storage, chain)?.reindex()?;
        storage.flush()?;

        println!("Finished!");
        Ok(())
    }

    fn balance(&self, address: &str) -> Result<()> {
        let address = Address::parse(address)?;
        let (_storage, _chain, utxo_set) = self.open_ledger()?;

        let balance = utxo_set.balance(&address.pub_key_hash()?)?;
        println!("Balance of {}: {}", address, balance);
        Ok(())
    }

    async fn send(&self, from: &str, to: &str, amount: u64, mine: bool) -> Result<()> {
        let from = Address::parse(from)?;
        let to = Address::parse(to)?;

        let (storage, chain, utxo_set) = self.open_ledger()?;
        let wallets = Wallets::load(self.config.wallets_path())?;
        let keypair = wallets.get(&from)?;

        let tx = TransactionBuilder::new(&utxo_set, &chain).build(keypair, &to, amount)?;
        log::info!("Created transaction {} ({} -> {})", tx.id, from, to);

        if mine {
            let coinbase = Transaction::coinbase(&from.pub_key_hash()?, "");
            let block = utxo_set.mine_block(vec![tx, coinbase])?;
            storage.flush()?;
            println!("Mined block {}", block.hash);
        } else {
            let client = Client::new(self.config.node_address.clone(), self.config.protocol_version);
            let message = Message::Tx {
                addr_from: self.config.node_address.clone(),
                transaction: tx.clone(),
            };
            client.send(&self.config.founding_address, &message).await?;
            println!("Sent transaction {} to {}", tx.id, self.config.founding_address);
        }

        println!("Success!");
        Ok(())
    }

    /// Run a node until Ctrl-C, then flush the store
    async fn start(&self, miner: Option<String>) -> Result<()> {
        println!("Starting node {}", self.config.node_id);

        let mut config = self.config.clone();
        if let Some(miner) = miner {
            Address::parse(&miner)?;
            println!("Mining is on. Address to receive rewards: {}", miner);
            config = config.with_miner(miner);
        }

        let (storage, chain, utxo_set) = self.open_ledger()?;
        utxo_set.reindex()?;
        let node = Node::new(config, chain, utxo_set);

        let result = tokio::select! {
            result = node.run() => result,
            signal = tokio::signal::ctrl_c() => {
                log::info!("Shutdown signal received");
                signal.map_err(Error::from)
            }
        };

        storage.flush()?;
        log::info!("Database flushed");
        result
    }

    fn print(&self) -> Result<()> {
        let (_storage, chain, _utxo_set) = self.open_ledger()?;

        for block in chain.iter() {
            let block = block?;
            let pow = ProofOfWork::new(&block, chain.difficulty());

            println!("============ Block {} ============", block.hash);
            println!("Height: {}", block.height);
            println!("Prev. hash: {}", block.prev_hash);
            println!("PoW: {}", pow.validate());
            for tx in &block.transactions {
                println!("{}", tx);
            }
            println!();
        }
        Ok(())
    }

    fn reindex(&self) -> Result<()> {
        let (storage, _chain, utxo_set) = self.open_ledger()?;
        utxo_set.reindex()?;
        storage.flush()?;

        println!(
            "Done! There are {} transactions in the UTXO set.",
            utxo_set.count_transactions()?
        );
        Ok(())
    }

    fn create_wallet(&self) -> Result<()> {
        let mut wallets = Wallets::load(self.config.wallets_path())?;
        let address = wallets.create_wallet();
        wallets.save()?;

        println!("New address: {}", address);
        Ok(())
    }

    fn addresses(&self) -> Result<()> {
        let wallets = Wallets::load(self.config.wallets_path())?;
        for address in wallets.addresses() {
            println!("{}", address);
        }
        Ok(())
    }
}
