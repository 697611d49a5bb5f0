use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UtxoError;
use crate::script::{LockingScript, ScriptType};

/// Transaction id, stored in internal (little-endian) byte order and shown
/// in the usual reversed hex display order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId([u8; 32]);

impl TxId {
    /// Wrap a hash already in internal byte order (as hashed, not as displayed).
    pub fn from_internal_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Bytes as they appear in a serialized outpoint.
    pub fn internal_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for TxId {
    type Err = UtxoError;

    fn from_str(txid_hex: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(txid_hex)
            .map_err(|e| UtxoError::InvalidTxid(format!("invalid txid hex: {e}")))?;
        let mut internal: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            UtxoError::InvalidTxid(format!("txid must be 32 bytes, got {}", b.len()))
        })?;
        internal.reverse();
        Ok(Self(internal))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = self.0;
        display.reverse();
        f.write_str(&hex::encode(display))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({self})")
    }
}

impl Serialize for TxId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub index: u32,
}

/// A spendable output as reported by the network layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Block height of confirmation, 0 while unconfirmed.
    pub height: u64,
    pub txid: TxId,
    pub index: u32,
    /// Value in the chain's smallest unit.
    pub amount: u64,
}

impl UnspentOutput {
    /// `height` is 0 for outputs still in the mempool.
    pub fn new(height: u64, txid: TxId, index: u32, amount: u64) -> Self {
        Self {
            height,
            txid,
            index,
            amount,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            index: self.index,
        }
    }

    /// Whether the output is in a block.
    pub fn is_confirmed(&self) -> bool {
        self.height > 0
    }
}

/// An unspent output together with the script that locks it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptedUnspentOutput {
    pub output: UnspentOutput,
    pub script: LockingScript,
}

impl ScriptedUnspentOutput {
    /// Attach the locking script an output was paid to.
    pub fn new(output: UnspentOutput, script: LockingScript) -> Self {
        Self { output, script }
    }

    pub fn amount(&self) -> u64 {
        self.output.amount
    }

    pub fn outpoint(&self) -> OutPoint {
        self.output.outpoint()
    }

    pub fn script_type(&self) -> ScriptType {
        self.script.script_type()
    }
}
