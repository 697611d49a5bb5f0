use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::UtxoError;
use crate::script::ScriptType;

/// Final sequence: no relative locktime, no replace-by-fee signalling.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Highest sequence that still opts in to replace-by-fee (BIP-125).
pub const SEQUENCE_RBF: u32 = 0xFFFF_FFFD;

/// SIGHASH_ALL.
pub const SIGHASH_ALL: u32 = 0x01;

/// SIGHASH_FORKID bit used by Bitcoin Cash and its descendants.
pub const SIGHASH_FORKID: u32 = 0x40;

/// Which digest algorithm signs non-witness inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SighashFlavor {
    /// Whole-transaction legacy digest; witness inputs use BIP-143.
    Legacy,
    /// BIP-143 style digest for every input (replay-protected forks).
    ForkId,
}

/// Chain-specific parameters injected into selection and encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub name: String,
    /// Base58 version byte for pay-to-pubkey-hash addresses.
    pub p2pkh_prefix: u8,
    /// Base58 version byte for pay-to-script-hash addresses.
    pub p2sh_prefix: u8,
    /// Human readable part of segwit addresses, if the chain has segwit.
    pub bech32_hrp: Option<String>,
    pub tx_version: u32,
    pub sequence: u32,
    pub sighash: SighashFlavor,
    pub sighash_type: u32,
    /// Minimum economical output value per script type. A script type that
    /// is missing here is not supported on the chain.
    pub dust: BTreeMap<ScriptType, u64>,
}

impl NetworkParams {
    /// Bitcoin mainnet: version 2 transactions with every standard script type.
    pub fn bitcoin() -> Self {
        Self {
            name: "bitcoin".into(),
            p2pkh_prefix: 0x00,
            p2sh_prefix: 0x05,
            bech32_hrp: Some("bc".into()),
            tx_version: 2,
            sequence: SEQUENCE_FINAL,
            sighash: SighashFlavor::Legacy,
            sighash_type: SIGHASH_ALL,
            dust: bitcoin_dust(),
        }
    }

    /// Bitcoin testnet: mainnet rules with testnet prefixes.
    pub fn bitcoin_testnet() -> Self {
        Self {
            name: "bitcoin-testnet".into(),
            p2pkh_prefix: 0x6F,
            p2sh_prefix: 0xC4,
            bech32_hrp: Some("tb".into()),
            ..Self::bitcoin()
        }
    }

    /// Litecoin: Bitcoin's rules under Litecoin prefixes.
    pub fn litecoin() -> Self {
        Self {
            name: "litecoin".into(),
            p2pkh_prefix: 0x30,
            p2sh_prefix: 0x32,
            bech32_hrp: Some("ltc".into()),
            ..Self::bitcoin()
        }
    }

    /// Dogecoin: legacy scripts only, version 1, 0.01 DOGE dust.
    pub fn dogecoin() -> Self {
        Self {
            name: "dogecoin".into(),
            p2pkh_prefix: 0x1E,
            p2sh_prefix: 0x16,
            bech32_hrp: None,
            tx_version: 1,
            sequence: SEQUENCE_FINAL,
            sighash: SighashFlavor::Legacy,
            sighash_type: SIGHASH_ALL,
            dust: legacy_dust(1_000_000),
        }
    }

    /// Dash: legacy scripts only, version 1.
    pub fn dash() -> Self {
        Self {
            name: "dash".into(),
            p2pkh_prefix: 0x4C,
            p2sh_prefix: 0x10,
            bech32_hrp: None,
            tx_version: 1,
            sequence: SEQUENCE_FINAL,
            sighash: SighashFlavor::Legacy,
            sighash_type: SIGHASH_ALL,
            dust: legacy_dust(546),
        }
    }

    /// Bitcoin Cash: legacy scripts signed with the fork-id digest (0x41).
    pub fn bitcoin_cash() -> Self {
        Self {
            name: "bitcoin-cash".into(),
            p2pkh_prefix: 0x00,
            p2sh_prefix: 0x05,
            bech32_hrp: None,
            tx_version: 2,
            sequence: SEQUENCE_FINAL,
            sighash: SighashFlavor::ForkId,
            sighash_type: SIGHASH_ALL | SIGHASH_FORKID,
            dust: legacy_dust(546),
        }
    }

    /// Copy of these parameters whose inputs signal replace-by-fee.
    pub fn with_rbf(&self) -> Self {
        Self {
            sequence: SEQUENCE_RBF,
            ..self.clone()
        }
    }

    /// Load parameters from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, UtxoError> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| UtxoError::InvalidConfig(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Reject parameter sets that cannot produce valid transactions.
    pub fn validate(&self) -> Result<(), UtxoError> {
        if self.dust.is_empty() {
            return Err(UtxoError::InvalidConfig(format!(
                "{}: no script types configured",
                self.name
            )));
        }
        if self.p2pkh_prefix == self.p2sh_prefix {
            return Err(UtxoError::InvalidConfig(format!(
                "{}: p2pkh and p2sh prefixes collide",
                self.name
            )));
        }
        if self.bech32_hrp.is_none() && self.dust.keys().any(|t| t.is_witness()) {
            return Err(UtxoError::InvalidConfig(format!(
                "{}: witness script types require a bech32 hrp",
                self.name
            )));
        }
        if self.sighash == SighashFlavor::ForkId && self.sighash_type & SIGHASH_FORKID == 0 {
            return Err(UtxoError::InvalidConfig(format!(
                "{}: fork-id signing without the fork-id sighash bit",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether outputs of `script_type` may be created on this chain.
    pub fn supports(&self, script_type: ScriptType) -> bool {
        self.dust.contains_key(&script_type)
    }

    /// Whether outputs locked by `script_type` can be signed for and spent.
    ///
    /// Only key-hash scripts can: the signer returns a signature and a
    /// public key, nothing else. P2WPKH further needs the chain to sign
    /// with the legacy flavour, since fork-id chains have no segwit.
    pub fn can_spend(&self, script_type: ScriptType) -> bool {
        let signable = match script_type {
            ScriptType::P2pkh => true,
            ScriptType::P2wpkh => self.sighash == SighashFlavor::Legacy,
            ScriptType::P2sh | ScriptType::P2wsh | ScriptType::P2tr => false,
        };
        signable && self.supports(script_type)
    }

    /// [`Self::can_spend`] as a `Result`.
    pub fn ensure_spendable(&self, script_type: ScriptType) -> Result<(), UtxoError> {
        if self.can_spend(script_type) {
            Ok(())
        } else {
            Err(UtxoError::UnsupportedScriptType(script_type))
        }
    }

    /// Dust threshold for `script_type`, or `UnsupportedScriptType` if the
    /// chain has none.
    pub fn dust(&self, script_type: ScriptType) -> Result<u64, UtxoError> {
        self.dust
            .get(&script_type)
            .copied()
            .ok_or(UtxoError::UnsupportedScriptType(script_type))
    }

    /// The single byte appended to each DER signature.
    pub fn sighash_byte(&self) -> u8 {
        (self.sighash_type & 0xFF) as u8
    }
}

/// Bitcoin Core dust limits at the default 3 sat/vB dust relay fee.
fn bitcoin_dust() -> BTreeMap<ScriptType, u64> {
    BTreeMap::from([
        (ScriptType::P2pkh, 546),
        (ScriptType::P2sh, 540),
        (ScriptType::P2wpkh, 294),
        (ScriptType::P2wsh, 330),
        (ScriptType::P2tr, 330),
    ])
}

fn legacy_dust(value: u64) -> BTreeMap<ScriptType, u64> {
    BTreeMap::from([(ScriptType::P2pkh, value), (ScriptType::P2sh, value)])
}
