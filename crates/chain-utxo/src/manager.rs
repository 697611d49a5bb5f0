use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::UtxoError;
use crate::fee::{FeePolicy, SizeEstimator};
use crate::network::NetworkParams;
use crate::preimage::{Destination, PreImage};
use crate::script::LockingScript;
use crate::selection::CoinSelector;
use crate::utxo::{OutPoint, ScriptedUnspentOutput, UnspentOutput};

/// A wallet address together with the script its outputs are locked by.
/// Change from spending its outputs is sent back to the same script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpendingAddress {
    pub address: String,
    pub script: LockingScript,
}

impl SpendingAddress {
    /// Pair an address string with the script its outputs are locked by.
    pub fn new(address: impl Into<String>, script: LockingScript) -> Self {
        Self {
            address: address.into(),
            script,
        }
    }
}

struct AddressState {
    script: LockingScript,
    outputs: Vec<ScriptedUnspentOutput>,
    /// Outputs spent by a broadcast transaction that the network layer has
    /// not yet reported as gone.
    locked: HashSet<OutPoint>,
}

impl AddressState {
    fn available(&self) -> Vec<ScriptedUnspentOutput> {
        self.outputs
            .iter()
            .filter(|o| !self.locked.contains(&o.outpoint()))
            .cloned()
            .collect()
    }
}

/// Address-scoped registry of spendable outputs and the entry point for
/// building pre-images.
///
/// Every call touching one address is queued on that address's mutex and
/// runs in submission order; different addresses proceed in parallel.
/// Only `update`, `lock` and `release` mutate state.
pub struct UnspentOutputManager {
    params: NetworkParams,
    sizes: Arc<dyn SizeEstimator>,
    addresses: RwLock<HashMap<String, Arc<Mutex<AddressState>>>>,
}

impl UnspentOutputManager {
    /// Create an empty manager for one chain. `sizes` prices candidate
    /// transactions for fee-rate policies.
    pub fn new(params: NetworkParams, sizes: Arc<dyn SizeEstimator>) -> Self {
        log::info!("Initializing unspent output manager for {}", params.name);
        Self {
            params,
            sizes,
            addresses: RwLock::new(HashMap::new()),
        }
    }

    /// Chain parameters this manager was built with.
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Replace everything known about `address` with `outputs`.
    ///
    /// Duplicate outpoints keep their first occurrence. Locked outputs that
    /// are no longer reported are considered spent and forgotten; locked
    /// outputs still reported stay locked.
    pub async fn update(
        &self,
        outputs: Vec<UnspentOutput>,
        address: &SpendingAddress,
    ) -> Result<(), UtxoError> {
        self.params.ensure_spendable(address.script.script_type())?;

        let state = self.state_or_insert(address);
        let mut state = state.lock().await;

        let mut seen = HashSet::with_capacity(outputs.len());
        state.script = address.script.clone();
        state.outputs = outputs
            .into_iter()
            .filter(|o| seen.insert(o.outpoint()))
            .map(|o| ScriptedUnspentOutput::new(o, address.script.clone()))
            .collect();

        let before = state.locked.len();
        state.locked.retain(|op| seen.contains(op));

        let unconfirmed = state
            .outputs
            .iter()
            .filter(|o| !o.output.is_confirmed())
            .count();
        log::info!(
            "Updated {} with {} outputs ({unconfirmed} unconfirmed, {} locks dropped, {} kept)",
            address.address,
            state.outputs.len(),
            before - state.locked.len(),
            state.locked.len(),
        );
        Ok(())
    }

    /// Every known output for `address`, locked ones included.
    pub async fn outputs(&self, address: &str) -> Vec<ScriptedUnspentOutput> {
        match self.state(address) {
            Some(state) => state.lock().await.outputs.clone(),
            None => Vec::new(),
        }
    }

    /// Outputs of `address` that a new selection may spend.
    pub async fn available_outputs(&self, address: &str) -> Vec<ScriptedUnspentOutput> {
        match self.state(address) {
            Some(state) => state.lock().await.available(),
            None => Vec::new(),
        }
    }

    /// Sum of [`Self::available_outputs`].
    pub async fn total_available(&self, address: &str) -> u64 {
        self.available_outputs(address)
            .await
            .iter()
            .map(ScriptedUnspentOutput::amount)
            .sum()
    }

    /// Build a pre-image paying `amount` to `destination` from the unlocked
    /// outputs of `address`, with change returned to the address's script.
    pub async fn preimage(
        &self,
        address: &str,
        amount: u64,
        fee: FeePolicy,
        destination: &LockingScript,
    ) -> Result<PreImage, UtxoError> {
        if amount == 0 {
            return Err(UtxoError::InvalidAmount("amount must be positive".into()));
        }
        let dest_type = destination.script_type();
        let dust = self.params.dust(dest_type).map_err(|_| {
            UtxoError::InvalidDestination(format!(
                "{dest_type} outputs are not supported on {}",
                self.params.name
            ))
        })?;
        if amount < dust {
            return Err(UtxoError::DustAmount { amount, dust });
        }

        let Some(state) = self.state(address) else {
            log::warn!("No outputs known for {address}");
            return Err(UtxoError::InsufficientFunds {
                needed: amount,
                available: 0,
            });
        };
        let state = state.lock().await;

        let change_type = state.script.script_type();
        self.params.ensure_spendable(change_type)?;
        let change_dust = self.params.dust(change_type)?;
        let selector = CoinSelector::new(self.sizes.as_ref(), change_dust);
        selector.select(
            &state.available(),
            &Destination::new(destination.clone(), amount),
            &state.script,
            fee,
        )
    }

    /// Exclude `inputs` from future selections until a refresh stops
    /// reporting them. Returns how many outputs became locked.
    pub async fn lock(&self, inputs: &[ScriptedUnspentOutput]) -> usize {
        let wanted: HashSet<OutPoint> = inputs.iter().map(|i| i.outpoint()).collect();
        let mut count = 0;
        for state in self.all_states() {
            let mut state = state.lock().await;
            let known: Vec<OutPoint> = state
                .outputs
                .iter()
                .map(|o| o.outpoint())
                .filter(|op| wanted.contains(op))
                .collect();
            for op in known {
                if state.locked.insert(op) {
                    count += 1;
                }
            }
        }
        log::info!("Locked {count} of {} outputs", wanted.len());
        count
    }

    /// Make previously locked `inputs` selectable again, e.g. after a
    /// failed broadcast. Returns how many outputs were unlocked.
    pub async fn release(&self, inputs: &[ScriptedUnspentOutput]) -> usize {
        let mut count = 0;
        for state in self.all_states() {
            let mut state = state.lock().await;
            for input in inputs {
                if state.locked.remove(&input.outpoint()) {
                    count += 1;
                }
            }
        }
        log::info!("Released {count} of {} outputs", inputs.len());
        count
    }

    fn state(&self, address: &str) -> Option<Arc<Mutex<AddressState>>> {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    fn state_or_insert(&self, address: &SpendingAddress) -> Arc<Mutex<AddressState>> {
        if let Some(state) = self.state(&address.address) {
            return state;
        }
        let mut addresses = self
            .addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        addresses
            .entry(address.address.clone())
            .or_insert_with(|| {
                log::debug!("Tracking new address {}", address.address);
                Arc::new(Mutex::new(AddressState {
                    script: address.script.clone(),
                    outputs: Vec::new(),
                    locked: HashSet::new(),
                }))
            })
            .clone()
    }

    fn all_states(&self) -> Vec<Arc<Mutex<AddressState>>> {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
