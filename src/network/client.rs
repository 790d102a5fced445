// Outbound messages: connect, send one message, close

use crate::core::{Block, Hash256, Transaction};
use crate::error::Result;
use crate::network::{Message, VersionMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Sends protocol messages on behalf of the node listening at `node_address`.
///
/// Delivery is best effort: an unreachable peer is logged and skipped.
#[derive(Debug, Clone)]
pub struct Client {
    node_address: String,
    version: u32,
}

impl Client {
    pub fn new(node_address: impl Into<String>, version: u32) -> Self {
        Self {
            node_address: node_address.into(),
            version,
        }
    }

    pub fn node_address(&self) -> &str {
        &self.node_address
    }

    /// Write one message and close the connection
    pub async fn send(&self, addr: &str, message: &Message) -> Result<()> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(&message.serialize()).await?;
        stream.shutdown().await?;
        Ok(())
    }

    async fn send_data(&self, addr: &str, message: Message) {
        log::debug!("Sending {} to {}", message.command(), addr);
        if let Err(e) = self.send(addr, &message).await {
            log::warn!("Failed to send {} to {}: {}", message.command(), addr, e);
        }
    }

    pub async fn send_version(&self, addr: &str, best_height: u64) {
        log::info!("Sending version to {} (height {})", addr, best_height);
        let message = Message::Version(VersionMessage {
            version: self.version,
            best_height,
            addr_from: self.node_address.clone(),
        });
        self.send_data(addr, message).await;
    }

    /// Share `peers` plus our own address
    pub async fn send_addresses(&self, addr: &str, peers: &[String]) {
        let mut addresses = peers.to_vec();
        addresses.push(self.node_address.clone());
        self.send_data(addr, Message::Addresses { addresses }).await;
    }

    pub async fn send_block_created(&self, addr: &str, block_hash: Hash256) {
        let message = Message::BlockCreated {
            addr_from: self.node_address.clone(),
            block_hash,
        };
        self.send_data(addr, message).await;
    }

    pub async fn send_block(&self, addr: &str, block: &Block) {
        log::info!("Sending block {} (height {}) to {}", block.hash, block.height, addr);
        let message = Message::Block {
            addr_from: self.node_address.clone(),
            block: block.clone(),
        };
        self.send_data(addr, message).await;
    }

    /// Ask `addr` for the block after `current_height`
    pub async fn get_next_block(&self, addr: &str, current_height: u64) {
        let height = current_height + 1;
        log::info!("Requesting block at height {} from {}", height, addr);
        let message = Message::GetBlockByHeight {
            addr_from: self.node_address.clone(),
            height,
        };
        self.send_data(addr, message).await;
    }

    pub async fn send_get_block(&self, addr: &str, hash: Hash256) {
        log::info!("Requesting block {} from {}", hash, addr);
        let message = Message::GetBlock {
            addr_from: self.node_address.clone(),
            hash,
        };
        self.send_data(addr, message).await;
    }

    pub async fn send_tx(&self, addr: &str, transaction: &Transaction) {
        let message = Message::Tx {
            addr_from: self.node_address.clone(),
            transaction: transaction.clone(),
        };
        self.send_data(addr, message).await;
    }

    pub async fn send_get_mempool_txs(&self, addr: &str) {
        let message = Message::GetMempoolTxs {
            addr_from: self.node_address.clone(),
        };
        self.send_data(addr, message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_delivers_whole_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = Client::new("localhost:3009", 1);
        client.send_addresses(&addr, &["localhost:3001".to_string()]).await;

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.unwrap();

        assert_eq!(
            Message::deserialize(&data).unwrap(),
            Message::Addresses {
                addresses: vec!["localhost:3001".to_string(), "localhost:3009".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_not_an_error() {
        // Bind and drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = Client::new("localhost:3009", 1);
        assert!(client.send(&addr, &Message::GetMempoolTxs { addr_from: "x".into() }).await.is_err());
        client.send_get_mempool_txs(&addr).await;
    }
}
