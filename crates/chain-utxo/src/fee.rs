use serde::{Deserialize, Serialize};

use crate::script::ScriptType;

/// Weight of version + locktime + input/output counts.
const TX_OVERHEAD_WEIGHT: u64 = 40;

/// Segwit marker and flag bytes (witness data, 1 wu each).
const SEGWIT_MARKER_WEIGHT: u64 = 2;

/// Non-witness bytes shared by every input: outpoint(36) + sequence(4) + scriptSig length(1).
const INPUT_BASE_BYTES: u64 = 41;

/// Witness stack for a single-key spend: count(1) + DER signature(~73) + compressed key(34).
const P2WPKH_WITNESS_BYTES: u64 = 108;

/// How the network fee of a transaction is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// Virtual size multiplied by a rate in smallest units per vbyte.
    Calculate { fee_rate: u64 },
    /// A fixed fee supplied by the caller.
    Exactly { fee: u64 },
}

/// Estimates the virtual size of a transaction with the given input and
/// output script types.
pub trait SizeEstimator: Send + Sync {
    fn virtual_size(&self, inputs: &[ScriptType], outputs: &[ScriptType]) -> u64;
}

/// Weight-based size estimate for signed single-key inputs.
///
/// P2SH inputs are sized as nested P2WPKH, P2WSH as a 2-of-3 multisig and
/// P2TR as a key-path spend.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualSizeEstimator;

impl VirtualSizeEstimator {
    fn input_weight(script_type: ScriptType) -> u64 {
        match script_type {
            // scriptSig: push(72-byte sig) + push(33-byte key) = 107 bytes
            ScriptType::P2pkh => (INPUT_BASE_BYTES + 107) * 4,
            // scriptSig: push(22-byte redeem script) = 23 bytes
            ScriptType::P2sh => (INPUT_BASE_BYTES + 23) * 4 + P2WPKH_WITNESS_BYTES,
            ScriptType::P2wpkh => INPUT_BASE_BYTES * 4 + P2WPKH_WITNESS_BYTES,
            ScriptType::P2wsh => INPUT_BASE_BYTES * 4 + 256,
            // count(1) + push(1) + schnorr signature(64)
            ScriptType::P2tr => INPUT_BASE_BYTES * 4 + 66,
        }
    }

    fn output_weight(script_type: ScriptType) -> u64 {
        // value(8) + script length(1) + script
        (8 + 1 + script_type.script_len() as u64) * 4
    }
}

impl SizeEstimator for VirtualSizeEstimator {
    fn virtual_size(&self, inputs: &[ScriptType], outputs: &[ScriptType]) -> u64 {
        let mut weight = TX_OVERHEAD_WEIGHT;
        if inputs.iter().any(|t| t.is_witness() || *t == ScriptType::P2sh) {
            weight += SEGWIT_MARKER_WEIGHT;
        }
        weight += inputs.iter().map(|t| Self::input_weight(*t)).sum::<u64>();
        weight += outputs.iter().map(|t| Self::output_weight(*t)).sum::<u64>();
        weight.div_ceil(4)
    }
}

/// Turns a [`FeePolicy`] and a candidate transaction shape into a fee.
#[derive(Clone, Copy)]
pub struct FeeEstimator<'a> {
    sizes: &'a dyn SizeEstimator,
}

impl<'a> FeeEstimator<'a> {
    /// Wrap a size estimator; the estimator is borrowed, not owned.
    pub fn new(sizes: &'a dyn SizeEstimator) -> Self {
        Self { sizes }
    }

    /// Fee for a transaction spending `inputs` into `outputs`.
    ///
    /// `Calculate` multiplies the estimated virtual size by the rate,
    /// saturating at `u64::MAX`; `Exactly` ignores the shape.
    pub fn fee(&self, policy: FeePolicy, inputs: &[ScriptType], outputs: &[ScriptType]) -> u64 {
        match policy {
            FeePolicy::Calculate { fee_rate } => self
                .sizes
                .virtual_size(inputs, outputs)
                .saturating_mul(fee_rate),
            FeePolicy::Exactly { fee } => fee,
        }
    }
}
