// Network protocol messages

use crate::core::{
    Block, Hash256, Serializable, Transaction, read_hash, read_string, read_u32, read_u64,
    read_var_bytes, read_varint, write_string, write_var_bytes, write_varint,
};
use crate::error::{Error, Result};
use std::io::Cursor;

/// Width of the zero-padded command name at the start of every message
pub const COMMAND_LENGTH: usize = 32;

/// Message commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Version,
    Addresses,
    BlockCreated,
    GetBlock,
    GetBlockByHeight,
    Block,
    Tx,
    GetMempoolTxs,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Addresses => "addresses",
            Command::BlockCreated => "block_created",
            Command::GetBlock => "get_block",
            Command::GetBlockByHeight => "get_block_by_height",
            Command::Block => "block",
            Command::Tx => "tx",
            Command::GetMempoolTxs => "get_mempool_txs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "version" => Some(Command::Version),
            "addresses" => Some(Command::Addresses),
            "block_created" => Some(Command::BlockCreated),
            "get_block" => Some(Command::GetBlock),
            "get_block_by_height" => Some(Command::GetBlockByHeight),
            "block" => Some(Command::Block),
            "tx" => Some(Command::Tx),
            "get_mempool_txs" => Some(Command::GetMempoolTxs),
            _ => None,
        }
    }

    /// Zero-padded command field
    pub fn to_bytes(&self) -> [u8; COMMAND_LENGTH] {
        let mut bytes = [0u8; COMMAND_LENGTH];
        let name = self.as_str().as_bytes();
        bytes[..name.len()].copy_from_slice(name);
        bytes
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake: protocol version, chain height and the sender's listen address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: u32,
    pub best_height: u64,
    pub addr_from: String,
}

/// Network message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Addresses { addresses: Vec<String> },
    BlockCreated { addr_from: String, block_hash: Hash256 },
    GetBlock { addr_from: String, hash: Hash256 },
    GetBlockByHeight { addr_from: String, height: u64 },
    Block { addr_from: String, block: Block },
    Tx { addr_from: String, transaction: Transaction },
    GetMempoolTxs { addr_from: String },
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version(_) => Command::Version,
            Message::Addresses { .. } => Command::Addresses,
            Message::BlockCreated { .. } => Command::BlockCreated,
            Message::GetBlock { .. } => Command::GetBlock,
            Message::GetBlockByHeight { .. } => Command::GetBlockByHeight,
            Message::Block { .. } => Command::Block,
            Message::Tx { .. } => Command::Tx,
            Message::GetMempoolTxs { .. } => Command::GetMempoolTxs,
        }
    }

    /// Address the sender listens on, if the message carries one
    pub fn addr_from(&self) -> Option<&str> {
        match self {
            Message::Version(v) => Some(&v.addr_from),
            Message::Addresses { .. } => None,
            Message::BlockCreated { addr_from, .. }
            | Message::GetBlock { addr_from, .. }
            | Message::GetBlockByHeight { addr_from, .. }
            | Message::Block { addr_from, .. }
            | Message::Tx { addr_from, .. }
            | Message::GetMempoolTxs { addr_from } => Some(addr_from),
        }
    }

    /// Command field followed by the payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = self.command().to_bytes().to_vec();
        self.write_payload(&mut bytes);
        bytes
    }

    fn write_payload(&self, buf: &mut Vec<u8>) {
        match self {
            Message::Version(v) => {
                buf.extend_from_slice(&v.version.to_le_bytes());
                buf.extend_from_slice(&v.best_height.to_le_bytes());
                write_string(buf, &v.addr_from);
            }
            Message::Addresses { addresses } => {
                write_varint(buf, addresses.len() as u64);
                for address in addresses {
                    write_string(buf, address);
                }
            }
            Message::BlockCreated { addr_from, block_hash: hash }
            | Message::GetBlock { addr_from, hash } => {
                write_string(buf, addr_from);
                buf.extend_from_slice(hash.as_bytes());
            }
            Message::GetBlockByHeight { addr_from, height } => {
                write_string(buf, addr_from);
                buf.extend_from_slice(&height.to_le_bytes());
            }
            Message::Block { addr_from, block } => {
                write_string(buf, addr_from);
                write_var_bytes(buf, &block.serialize());
            }
            Message::Tx { addr_from, transaction } => {
                write_string(buf, addr_from);
                write_var_bytes(buf, &transaction.serialize());
            }
            Message::GetMempoolTxs { addr_from } => write_string(buf, addr_from),
        }
    }

    /// Parse a full message as read off the wire
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < COMMAND_LENGTH {
            return Err(Error::Message(format!(
                "message too short: {} bytes",
                data.len()
            )));
        }

        let (name, payload) = data.split_at(COMMAND_LENGTH);
        let name: Vec<u8> = name.iter().copied().filter(|&b| b != 0).collect();
        let name = String::from_utf8(name)
            .map_err(|e| Error::Message(format!("invalid command name: {}", e)))?;
        let command = Command::from_name(&name).ok_or(Error::UnknownCommand(name))?;

        let mut cursor = Cursor::new(payload);
        let message = match command {
            Command::Version => Message::Version(VersionMessage {
                version: read_u32(&mut cursor)?,
                best_height: read_u64(&mut cursor)?,
                addr_from: read_string(&mut cursor)?,
            }),
            Command::Addresses => {
                let count = read_varint(&mut cursor)?;
                let mut addresses = Vec::new();
                for _ in 0..count {
                    addresses.push(read_string(&mut cursor)?);
                }
                Message::Addresses { addresses }
            }
            Command::BlockCreated => Message::BlockCreated {
                addr_from: read_string(&mut cursor)?,
                block_hash: read_hash(&mut cursor)?,
            },
            Command::GetBlock => Message::GetBlock {
                addr_from: read_string(&mut cursor)?,
                hash: read_hash(&mut cursor)?,
            },
            Command::GetBlockByHeight => Message::GetBlockByHeight {
                addr_from: read_string(&mut cursor)?,
                height: read_u64(&mut cursor)?,
            },
            Command::Block => Message::Block {
                addr_from: read_string(&mut cursor)?,
                block: Block::deserialize(&read_var_bytes(&mut cursor)?)?,
            },
            Command::Tx => Message::Tx {
                addr_from: read_string(&mut cursor)?,
                transaction: Transaction::deserialize(&read_var_bytes(&mut cursor)?)?,
            },
            Command::GetMempoolTxs => Message::GetMempoolTxs {
                addr_from: read_string(&mut cursor)?,
            },
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_conversion() {
        assert_eq!(Command::GetBlockByHeight.as_str(), "get_block_by_height");
        assert_eq!(Command::from_name("block_created"), Some(Command::BlockCreated));
        assert_eq!(Command::from_name("verack"), None);
    }

    #[test]
    fn test_command_field_is_zero_padded() {
        let bytes = Message::GetMempoolTxs {
            addr_from: "localhost:3001".to_string(),
        }
        .serialize();

        assert_eq!(&bytes[..15], b"get_mempool_txs");
        assert!(bytes[15..COMMAND_LENGTH].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_version_serialization() {
        let msg = Message::Version(VersionMessage {
            version: 1,
            best_height: 7,
            addr_from: "localhost:3002".to_string(),
        });

        let deserialized = Message::deserialize(&msg.serialize()).unwrap();
        assert_eq!(deserialized, msg);
        assert_eq!(deserialized.addr_from(), Some("localhost:3002"));
    }

    #[test]
    fn test_block_and_tx_serialization() {
        let tx = Transaction::coinbase(&[4; 20], "");
        let block = Block::new(vec![tx.clone()], Hash256::new([2; 32]), 3);

        let msg = Message::Block {
            addr_from: "localhost:3000".to_string(),
            block: block.clone(),
        };
        match Message::deserialize(&msg.serialize()).unwrap() {
            Message::Block { block: decoded, .. } => assert_eq!(decoded, block),
            other => panic!("Wrong message: {:?}", other.command()),
        }

        let msg = Message::Tx {
            addr_from: "localhost:3000".to_string(),
            transaction: tx.clone(),
        };
        assert_eq!(Message::deserialize(&msg.serialize()).unwrap(), msg);
    }

    #[test]
    fn test_addresses_serialization() {
        let msg = Message::Addresses {
            addresses: vec!["localhost:3001".to_string(), "localhost:3002".to_string()],
        };
        let decoded = Message::deserialize(&msg.serialize()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.addr_from(), None);
    }

    #[test]
    fn test_unknown_and_truncated_messages() {
        let mut unknown = [0u8; COMMAND_LENGTH].to_vec();
        unknown[..5].copy_from_slice(b"hello");
        assert!(matches!(
            Message::deserialize(&unknown),
            Err(Error::UnknownCommand(name)) if name == "hello"
        ));

        assert!(matches!(Message::deserialize(b"short"), Err(Error::Message(_))));

        let mut truncated = Message::GetBlockByHeight {
            addr_from: "localhost:3000".to_string(),
            height: 9,
        }
        .serialize();
        truncated.truncate(truncated.len() - 3);
        assert!(Message::deserialize(&truncated).is_err());
    }
}
