use thiserror::Error;

use crate::script::ScriptType;

/// UTXO engine errors. All of them are terminal for the call that raised them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UtxoError {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount {amount} is below the dust threshold {dust}")]
    DustAmount { amount: u64, dust: u64 },

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("unsupported script type: {0}")]
    UnsupportedScriptType(ScriptType),

    #[error("transaction build error: {0}")]
    TransactionBuild(String),

    #[error("invalid txid: {0}")]
    InvalidTxid(String),

    #[error("invalid network config: {0}")]
    InvalidConfig(String),
}
