use serde::{Deserialize, Serialize};

use crate::script::LockingScript;
use crate::utxo::ScriptedUnspentOutput;

/// The payment target of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub script: LockingScript,
    pub amount: u64,
}

impl Destination {
    /// A payment of `amount` to `script`.
    pub fn new(script: LockingScript, amount: u64) -> Self {
        Self { script, amount }
    }
}

/// An output of a pre-image transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreImageOutput {
    Destination { script: LockingScript, value: u64 },
    Change { script: LockingScript, value: u64 },
}

impl PreImageOutput {
    /// Output value in the chain's smallest unit.
    pub fn value(&self) -> u64 {
        match self {
            PreImageOutput::Destination { value, .. } | PreImageOutput::Change { value, .. } => {
                *value
            }
        }
    }

    /// Script the value is locked to.
    pub fn script(&self) -> &LockingScript {
        match self {
            PreImageOutput::Destination { script, .. } | PreImageOutput::Change { script, .. } => {
                script
            }
        }
    }

    /// Whether this output returns funds to the spending address.
    pub fn is_change(&self) -> bool {
        matches!(self, PreImageOutput::Change { .. })
    }
}

/// A fully determined, unsigned transaction: which outputs are spent, what
/// is paid where, and the fee. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreImage {
    pub inputs: Vec<ScriptedUnspentOutput>,
    pub outputs: Vec<PreImageOutput>,
    pub fee: u64,
}

impl PreImage {
    /// Sum of all selected input amounts.
    pub fn input_total(&self) -> u64 {
        self.inputs.iter().map(|i| i.amount()).sum()
    }

    /// Sum of all output values, fee excluded.
    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(PreImageOutput::value).sum()
    }

    /// Value sent to the destination.
    pub fn destination_value(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|o| !o.is_change())
            .map(PreImageOutput::value)
            .sum()
    }

    /// Value returned as change, 0 when there is no change output.
    pub fn change(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.is_change())
            .map(PreImageOutput::value)
            .sum()
    }

    /// `inputs == outputs + fee`.
    pub fn is_balanced(&self) -> bool {
        self.output_total().checked_add(self.fee) == Some(self.input_total())
    }
}
