// Transaction builder

use crate::chain::Blockchain;
use crate::core::{Transaction, TxInput, TxOutput};
use crate::error::{Error, Result};
use crate::storage::UtxoSet;
use crate::wallet::{Address, KeyPair};

/// Builds signed spends from the UTXO index
pub struct TransactionBuilder<'a> {
    utxo_set: &'a UtxoSet,
    chain: &'a Blockchain,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(utxo_set: &'a UtxoSet, chain: &'a Blockchain) -> Self {
        Self { utxo_set, chain }
    }

    /// Build a transaction moving `amount` from `from` to `to`.
    ///
    /// Outputs are selected greedily; anything above `amount` comes back to
    /// the sender as a change output.
    pub fn build(&self, from: &KeyPair, to: &Address, amount: u64) -> Result<Transaction> {
        let sender_hash = from.pub_key_hash();
        let recipient_hash = to.pub_key_hash()?;

        let (accumulated, spendable) = self.utxo_set.find_spendable_outputs(&sender_hash, amount)?;
        if accumulated < amount {
            return Err(Error::InsufficientFunds {
                available: accumulated,
                required: amount,
            });
        }

        let pub_key = from.pub_key_bytes();
        let mut inputs = Vec::new();
        for (txid, indices) in &spendable {
            for &out in indices {
                inputs.push(TxInput::new(*txid, out, pub_key.clone()));
            }
        }

        let mut outputs = vec![TxOutput::new(amount, recipient_hash)];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, sender_hash));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.chain.sign_transaction(&mut tx, &from.secret_key)?;

        log::debug!("Built transaction {} ({} -> {}, {})", tx.id, from.address(), to, amount);
        Ok(tx)
    }

    pub fn balance(&self, address: &Address) -> Result<u64> {
        self.utxo_set.balance(&address.pub_key_hash()?)
    }
}
