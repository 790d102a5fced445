// P2P networking

mod client;
mod mempool;
mod message;
pub mod miner;
mod node;
mod peers;

pub use client::Client;
pub use mempool::Mempool;
pub use message::{COMMAND_LENGTH, Command, Message, VersionMessage};
pub use node::Node;
pub use peers::PeerSet;
