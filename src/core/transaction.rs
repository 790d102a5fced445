// Transaction data structures, signing and verification

use super::serialize::{
    read_hash, read_i64, read_u32, read_u64, read_var_bytes, read_varint, write_var_bytes,
    write_varint,
};
use crate::core::{Hash256, Serializable, hash160, sha256};
use crate::error::{Error, Result};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::time::{SystemTime, UNIX_EPOCH};

/// Output index carried by a coinbase input (no real output is spent)
pub const COINBASE_OUT_INDEX: u32 = u32::MAX;

/// Amount minted by every coinbase transaction
pub const MINING_REWARD: u64 = 20;

/// Transaction input - references an output of a prior transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the referenced transaction (zero for coinbase)
    pub prev_tx_id: Hash256,
    /// Index of the referenced output
    pub out: u32,
    pub signature: Vec<u8>,
    /// Spender's public key; arbitrary data for coinbase
    pub pub_key: Vec<u8>,
}

impl TxInput {
    pub fn new(prev_tx_id: Hash256, out: u32, pub_key: Vec<u8>) -> Self {
        Self {
            prev_tx_id,
            out,
            signature: Vec::new(),
            pub_key,
        }
    }

    /// Create a coinbase input carrying `data` in the public key slot
    pub fn coinbase(data: Vec<u8>) -> Self {
        Self::new(Hash256::zero(), COINBASE_OUT_INDEX, data)
    }

    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_id.is_zero() && self.out == COINBASE_OUT_INDEX
    }

    /// Whether this input's public key hashes to `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash160(&self.pub_key).as_slice() == pub_key_hash
    }

    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.prev_tx_id.as_bytes());
        buf.extend_from_slice(&self.out.to_le_bytes());
        write_var_bytes(buf, &self.signature);
        write_var_bytes(buf, &self.pub_key);
    }

    fn read(reader: &mut dyn Read) -> Result<Self> {
        Ok(Self {
            prev_tx_id: read_hash(reader)?,
            out: read_u32(reader)?,
            signature: read_var_bytes(reader)?,
            pub_key: read_var_bytes(reader)?,
        })
    }
}

/// Transaction output - value locked to a public key hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: Vec<u8>) -> Self {
        Self {
            value,
            pub_key_hash,
        }
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(buf, &self.pub_key_hash);
    }

    pub(crate) fn read(reader: &mut dyn Read) -> Result<Self> {
        Ok(Self {
            value: read_u64(reader)?,
            pub_key_hash: read_var_bytes(reader)?,
        })
    }
}

/// Signed spend unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hash of the transaction with this field zeroed; set once at creation
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Creation time, nanoseconds since the Unix epoch
    pub timestamp: i64,
}

impl Transaction {
    /// Create an unsigned transaction stamped with the current time
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash256::zero(),
            inputs,
            outputs,
            timestamp: now_nanos(),
        };
        tx.id = tx.hash();
        tx
    }

    /// Create a coinbase transaction paying the mining reward to `to`.
    /// Empty `data` is replaced by 24 random bytes so coinbase ids differ.
    pub fn coinbase(to: &[u8], data: &str) -> Self {
        let data = if data.is_empty() {
            hex::encode(rand::random::<[u8; 24]>())
        } else {
            data.to_string()
        };

        Self::new(
            vec![TxInput::coinbase(data.into_bytes())],
            vec![TxOutput::new(MINING_REWARD, to.to_vec())],
        )
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Hex form of the id, used as mempool and UTXO keys
    pub fn get_id(&self) -> String {
        self.id.to_hex()
    }

    /// SHA-256 of the binary encoding with the id zeroed
    pub fn hash(&self) -> Hash256 {
        let mut copy = self.clone();
        copy.id = Hash256::zero();
        sha256(&Serializable::serialize(&copy))
    }

    /// JSON encoding, hashed per transaction for the proof-of-work challenge
    pub fn json_serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |total, out| total.saturating_add(out.value))
    }

    /// Copy with every input's signature and public key cleared
    pub fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput::new(input.prev_tx_id, input.out, Vec::new()))
            .collect();

        Transaction {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Sign every input with `secret_key`.
    /// `prev_txs` must contain each referenced transaction, keyed by id.
    pub fn sign(
        &mut self,
        secret_key: &SecretKey,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        for input in &self.inputs {
            if !prev_txs.contains_key(&input.prev_tx_id) {
                return Err(Error::TransactionNotFound(input.prev_tx_id.to_hex()));
            }
        }

        let secp = Secp256k1::signing_only();
        let mut tx_copy = self.trimmed_copy();

        for index in 0..self.inputs.len() {
            let prev_output = referenced_output(&self.inputs[index], prev_txs)?;
            tx_copy.inputs[index].pub_key = prev_output.pub_key_hash.clone();

            let message = signing_message(&tx_copy);
            let signature = secp.sign_ecdsa(&message, secret_key);
            self.inputs[index].signature = signature.serialize_compact().to_vec();

            tx_copy.inputs[index].pub_key.clear();
        }

        Ok(())
    }

    /// Check every input's signature against the referenced outputs.
    /// Coinbase transactions always pass.
    pub fn verify(&self, prev_txs: &HashMap<Hash256, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let secp = Secp256k1::verification_only();
        let mut tx_copy = self.trimmed_copy();

        for (index, input) in self.inputs.iter().enumerate() {
            if !prev_txs.contains_key(&input.prev_tx_id) {
                return Err(Error::TransactionNotFound(input.prev_tx_id.to_hex()));
            }
            let prev_output = match referenced_output(input, prev_txs) {
                Ok(output) => output,
                Err(_) => return Ok(false),
            };

            if !input.uses_key(&prev_output.pub_key_hash) {
                return Ok(false);
            }

            tx_copy.inputs[index].pub_key = prev_output.pub_key_hash.clone();
            let message = signing_message(&tx_copy);
            tx_copy.inputs[index].pub_key.clear();

            let (Ok(public_key), Ok(signature)) = (
                PublicKey::from_slice(&input.pub_key),
                Signature::from_compact(&input.signature),
            ) else {
                return Ok(false);
            };

            if secp.verify_ecdsa(&message, &signature, &public_key).is_err() {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Deserialize from a reader positioned at a transaction
    pub fn from_reader(reader: &mut dyn Read) -> Result<Self> {
        let id = read_hash(reader)?;

        let input_count = read_varint(reader)? as usize;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            inputs.push(TxInput::read(reader)?);
        }

        let output_count = read_varint(reader)? as usize;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TxOutput::read(reader)?);
        }

        let timestamp = read_i64(reader)?;

        Ok(Self {
            id,
            inputs,
            outputs,
            timestamp,
        })
    }
}

/// Order transactions by creation time; this order feeds every block hash
pub fn sort_by_timestamp(txs: &mut [Transaction]) {
    txs.sort_by_key(|tx| tx.timestamp);
}

fn referenced_output<'a>(
    input: &TxInput,
    prev_txs: &'a HashMap<Hash256, Transaction>,
) -> Result<&'a TxOutput> {
    prev_txs
        .get(&input.prev_tx_id)
        .and_then(|prev| prev.outputs.get(input.out as usize))
        .ok_or_else(|| Error::OutputNotFound {
            tx: input.prev_tx_id.to_hex(),
            index: input.out,
        })
}

// The signed payload is SHA-256 of the trimmed copy's binary encoding, with the
// scratch public key of the input being processed set to the prior output's hash.
fn signing_message(tx_copy: &Transaction) -> Message {
    Message::from_digest(*sha256(&Serializable::serialize(tx_copy)).as_bytes())
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

impl Serializable for Transaction {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.id.as_bytes());

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write(&mut buf);
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut buf);
        }

        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Self::from_reader(&mut cursor)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "--- Transaction {}:", self.id)?;
        for (i, input) in self.inputs.iter().enumerate() {
            writeln!(f, "     Input {}:", i)?;
            writeln!(f, "       TXID:      {}", input.prev_tx_id)?;
            writeln!(f, "       Out:       {}", input.out)?;
            writeln!(f, "       Signature: {}", hex::encode(&input.signature))?;
            writeln!(f, "       PubKey:    {}", hex::encode(&input.pub_key))?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(f, "     Output {}:", i)?;
            writeln!(f, "       Value:      {}", output.value)?;
            write!(f, "       PubKeyHash: {}", hex::encode(&output.pub_key_hash))?;
            if i + 1 < self.outputs.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
