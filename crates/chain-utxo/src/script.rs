use std::fmt;

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_PUSHNUM_1;
use bitcoin::script::{Builder, ScriptBuf};
use bitcoin::{PubkeyHash, ScriptHash, WPubkeyHash, WScriptHash};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::UtxoError;

/// Standard locking script templates the engine knows how to size and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

impl ScriptType {
    /// Whether spending this script type puts data in the witness section.
    pub fn is_witness(self) -> bool {
        matches!(self, ScriptType::P2wpkh | ScriptType::P2wsh | ScriptType::P2tr)
    }

    /// Serialized length of the locking script itself.
    pub fn script_len(self) -> usize {
        match self {
            ScriptType::P2pkh => 25,
            ScriptType::P2sh => 23,
            ScriptType::P2wpkh => 22,
            ScriptType::P2wsh | ScriptType::P2tr => 34,
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptType::P2pkh => "p2pkh",
            ScriptType::P2sh => "p2sh",
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2wsh => "p2wsh",
            ScriptType::P2tr => "p2tr",
        };
        f.write_str(name)
    }
}

/// A locking script (scriptPubKey) together with its classified template.
///
/// Serialized as the hex of the raw script; the template is re-derived on
/// deserialization so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockingScript {
    script_type: ScriptType,
    script: ScriptBuf,
}

impl LockingScript {
    /// Classify raw script bytes.
    ///
    /// Only the standard templates in [`ScriptType`] are accepted; anything
    /// else (bare multisig, OP_RETURN, non-standard) is an invalid destination.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, UtxoError> {
        let script = ScriptBuf::from_bytes(bytes);
        let script_type = if script.is_p2pkh() {
            ScriptType::P2pkh
        } else if script.is_p2sh() {
            ScriptType::P2sh
        } else if script.is_p2wpkh() {
            ScriptType::P2wpkh
        } else if script.is_p2wsh() {
            ScriptType::P2wsh
        } else if script.is_p2tr() {
            ScriptType::P2tr
        } else if script.is_empty() {
            return Err(UtxoError::InvalidDestination("empty script".into()));
        } else {
            return Err(UtxoError::InvalidDestination(format!(
                "non-standard script {}",
                hex::encode(script.as_bytes())
            )));
        };
        Ok(Self {
            script_type,
            script,
        })
    }

    /// Parse a hex-encoded script.
    pub fn from_hex(script_hex: &str) -> Result<Self, UtxoError> {
        let bytes = hex::decode(script_hex)
            .map_err(|e| UtxoError::InvalidDestination(format!("invalid script hex: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG
    pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Self {
        Self {
            script_type: ScriptType::P2pkh,
            script: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(*pubkey_hash)),
        }
    }

    /// OP_HASH160 <20-byte hash> OP_EQUAL
    pub fn p2sh(script_hash: &[u8; 20]) -> Self {
        Self {
            script_type: ScriptType::P2sh,
            script: ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(*script_hash)),
        }
    }

    /// OP_0 <20-byte hash>
    pub fn p2wpkh(pubkey_hash: &[u8; 20]) -> Self {
        Self {
            script_type: ScriptType::P2wpkh,
            script: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(*pubkey_hash)),
        }
    }

    /// OP_0 <32-byte hash>
    pub fn p2wsh(script_hash: &[u8; 32]) -> Self {
        Self {
            script_type: ScriptType::P2wsh,
            script: ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array(*script_hash)),
        }
    }

    /// OP_1 <32-byte output key>. The key is taken as already tweaked and
    /// is not checked for being on the curve.
    pub fn p2tr(output_key: &[u8; 32]) -> Self {
        let script = Builder::new()
            .push_opcode(OP_PUSHNUM_1)
            .push_slice(output_key)
            .into_script();
        Self {
            script_type: ScriptType::P2tr,
            script,
        }
    }

    pub fn script_type(&self) -> ScriptType {
        self.script_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.script.as_bytes()
    }

    /// The script as a `bitcoin` crate value, for transaction building.
    pub fn as_script_buf(&self) -> &ScriptBuf {
        &self.script
    }

    /// The 20-byte key hash committed to by a P2PKH or P2WPKH script.
    pub fn pubkey_hash(&self) -> Option<[u8; 20]> {
        let range = match self.script_type {
            ScriptType::P2pkh => 3..23,
            ScriptType::P2wpkh => 2..22,
            _ => return None,
        };
        self.as_bytes().get(range)?.try_into().ok()
    }
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

impl Serialize for LockingScript {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for LockingScript {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_script_format() {
        let hash = [0x42; 20];
        let script = LockingScript::p2pkh(&hash);
        assert_eq!(
            hex::encode(script.as_bytes()),
            format!("76a914{}88ac", "42".repeat(20))
        );
        assert_eq!(script.pubkey_hash(), Some(hash));
    }

    #[test]
    fn p2tr_script_format() {
        let script = LockingScript::p2tr(&[0x07; 32]);
        assert_eq!(
            hex::encode(script.as_bytes()),
            format!("5120{}", "07".repeat(32))
        );
        assert_eq!(script.pubkey_hash(), None);
    }

    #[test]
    fn constructors_match_classification() {
        let scripts = [
            LockingScript::p2pkh(&[1; 20]),
            LockingScript::p2sh(&[2; 20]),
            LockingScript::p2wpkh(&[3; 20]),
            LockingScript::p2wsh(&[4; 32]),
            LockingScript::p2tr(&[5; 32]),
        ];
        for script in scripts {
            let parsed = LockingScript::from_bytes(script.as_bytes().to_vec()).unwrap();
            assert_eq!(parsed, script);
            assert_eq!(parsed.as_bytes().len(), parsed.script_type().script_len());
        }
    }

    #[test]
    fn p2wpkh_from_hex() {
        let script =
            LockingScript::from_hex("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        assert_eq!(script.script_type(), ScriptType::P2wpkh);
        assert!(script.script_type().is_witness());
    }

    #[test]
    fn op_return_is_rejected() {
        let result = LockingScript::from_hex("6a0468656c6c6f");
        assert!(matches!(result, Err(UtxoError::InvalidDestination(_))));
    }

    #[test]
    fn empty_script_is_rejected() {
        assert!(LockingScript::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn bad_hex_is_rejected() {
        assert!(LockingScript::from_hex("zz").is_err());
    }

    #[test]
    fn hash160_known_vector() {
        // Generator point G, compressed.
        let pubkey =
            hex::decode("0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798")
                .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn serde_uses_hex() {
        let script = LockingScript::p2wpkh(&[0xAB; 20]);
        let json = serde_json::to_string(&script).unwrap();
        assert!(json.contains(&format!("0014{}", "ab".repeat(20))));
        let back: LockingScript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, script);
    }
}
