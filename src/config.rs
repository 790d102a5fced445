// Node configuration

use crate::consensus::DIFFICULTY;
use std::path::PathBuf;
use std::time::Duration;

/// Address of the node every other node bootstraps from
pub const FOUNDING_ADDRESS: &str = "localhost:3000";

/// Wire protocol version announced in `version` messages
pub const PROTOCOL_VERSION: u32 = 1;

/// Interval between mining attempts
pub const BLOCK_TIME: Duration = Duration::from_secs(5);

pub const DEFAULT_DATA_DIR: &str = "./tmp";

/// Per-node settings
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    /// Address this node listens on and announces to peers
    pub node_address: String,
    pub founding_address: String,
    /// Reward address; mining is enabled when set
    pub miner_address: Option<String>,
    pub block_time: Duration,
    pub difficulty: u32,
    pub protocol_version: u32,
    pub data_dir: PathBuf,
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            node_address: format!("localhost:{}", node_id),
            node_id,
            founding_address: FOUNDING_ADDRESS.to_string(),
            miner_address: None,
            block_time: BLOCK_TIME,
            difficulty: DIFFICULTY,
            protocol_version: PROTOCOL_VERSION,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }

    pub fn with_miner(mut self, address: impl Into<String>) -> Self {
        self.miner_address = Some(address.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn is_founding_node(&self) -> bool {
        self.node_address == self.founding_address
    }

    pub fn is_miner(&self) -> bool {
        self.miner_address.is_some()
    }

    /// sled database of this node
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("blocks_{}", self.node_id))
    }

    pub fn wallets_path(&self) -> PathBuf {
        self.data_dir.join(format!("wallets_{}.json", self.node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::new("3001");

        assert_eq!(config.node_address, "localhost:3001");
        assert_eq!(config.founding_address, "localhost:3000");
        assert_eq!(config.block_time, Duration::from_secs(5));
        assert_eq!(config.difficulty, 18);
        assert_eq!(config.protocol_version, 1);
        assert!(!config.is_founding_node());
        assert!(!config.is_miner());
        assert_eq!(config.db_path(), PathBuf::from("./tmp/blocks_3001"));
        assert_eq!(config.wallets_path(), PathBuf::from("./tmp/wallets_3001.json"));
    }

    #[test]
    fn test_founding_miner() {
        let config = NodeConfig::new("3000").with_miner("1abc").with_difficulty(8);
        assert!(config.is_founding_node());
        assert!(config.is_miner());
        assert_eq!(config.difficulty, 8);
    }
}
