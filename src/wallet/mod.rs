// Wallet and transaction building

mod keystore;
mod tx_builder;

pub use keystore::{ADDRESS_VERSION, Address, CHECKSUM_LENGTH, KeyPair, Wallets};
pub use tx_builder::TransactionBuilder;
