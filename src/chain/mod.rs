// Chain of blocks and its traversal

mod blockchain;
mod iter;

pub use blockchain::{Blockchain, GENESIS_DATA};
pub use iter::BlockIterator;
