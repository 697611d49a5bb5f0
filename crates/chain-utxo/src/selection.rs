//! Largest-first coin selection.
//!
//! Candidates are ordered by descending value (ties keep their original
//! order) and accumulated one at a time until the first prefix that can pay
//! the destination plus fee. This is a deterministic minimal-input
//! heuristic, not a waste-minimizing search: it never claims the cheapest
//! possible transaction, only the fewest inputs along the largest-first
//! order.

use crate::error::UtxoError;
use crate::fee::{FeeEstimator, FeePolicy, SizeEstimator};
use crate::preimage::{Destination, PreImage, PreImageOutput};
use crate::script::{LockingScript, ScriptType};
use crate::utxo::ScriptedUnspentOutput;

/// Picks inputs and builds the output list for a single payment.
pub struct CoinSelector<'a> {
    fees: FeeEstimator<'a>,
    change_dust: u64,
}

impl<'a> CoinSelector<'a> {
    /// `change_dust` is the minimum value worth creating a change output for.
    pub fn new(sizes: &'a dyn SizeEstimator, change_dust: u64) -> Self {
        Self {
            fees: FeeEstimator::new(sizes),
            change_dust,
        }
    }

    /// Select inputs from `available` paying `destination`, returning any
    /// worthwhile leftover to `change`.
    ///
    /// With two outputs the fee is computed for destination + change. When
    /// the leftover would be below the change dust threshold the change
    /// output is dropped, the fee is recomputed for a single output and
    /// everything not spent on fee goes to the destination.
    ///
    /// The only failure is [`UtxoError::InsufficientFunds`].
    pub fn select(
        &self,
        available: &[ScriptedUnspentOutput],
        destination: &Destination,
        change: &LockingScript,
        policy: FeePolicy,
    ) -> Result<PreImage, UtxoError> {
        let mut sorted: Vec<&ScriptedUnspentOutput> = available.iter().collect();
        sorted.sort_by(|a, b| b.amount().cmp(&a.amount()));

        let mut selected: Vec<&ScriptedUnspentOutput> = Vec::new();
        let mut input_types: Vec<ScriptType> = Vec::new();
        let mut accumulated: u64 = 0;

        for utxo in sorted {
            selected.push(utxo);
            input_types.push(utxo.script_type());
            accumulated = accumulated.saturating_add(utxo.amount());

            if let Some((outputs, fee)) =
                self.layout(&input_types, accumulated, destination, change, policy)
            {
                log::debug!(
                    "selected {} of {} outputs ({accumulated}), {} output(s), fee {fee}",
                    selected.len(),
                    available.len(),
                    outputs.len(),
                );
                return Ok(PreImage {
                    inputs: selected.into_iter().cloned().collect(),
                    outputs,
                    fee,
                });
            }
        }

        let fee = self
            .fees
            .fee(policy, &input_types, &[destination.script.script_type()]);
        Err(UtxoError::InsufficientFunds {
            needed: destination.amount.saturating_add(fee),
            available: accumulated,
        })
    }

    /// Output list and fee for the current input set, or `None` if it
    /// cannot pay for the destination yet.
    fn layout(
        &self,
        input_types: &[ScriptType],
        accumulated: u64,
        destination: &Destination,
        change: &LockingScript,
        policy: FeePolicy,
    ) -> Option<(Vec<PreImageOutput>, u64)> {
        let dest_type = destination.script.script_type();

        let fee = self
            .fees
            .fee(policy, input_types, &[dest_type, change.script_type()]);
        let leftover = accumulated
            .checked_sub(destination.amount)
            .and_then(|rest| rest.checked_sub(fee));
        if let Some(leftover) = leftover {
            if leftover > 0 && leftover >= self.change_dust {
                let outputs = vec![
                    PreImageOutput::Destination {
                        script: destination.script.clone(),
                        value: destination.amount,
                    },
                    PreImageOutput::Change {
                        script: change.clone(),
                        value: leftover,
                    },
                ];
                return Some((outputs, fee));
            }
        }

        // Sub-dust leftover is swept into the destination.
        let fee = self.fees.fee(policy, input_types, &[dest_type]);
        let value = accumulated.checked_sub(fee)?;
        if value < destination.amount {
            return None;
        }
        let outputs = vec![PreImageOutput::Destination {
            script: destination.script.clone(),
            value,
        }];
        Some((outputs, fee))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::fee::VirtualSizeEstimator;
    use crate::utxo::{TxId, UnspentOutput};

    struct FixedSize(u64);

    impl SizeEstimator for FixedSize {
        fn virtual_size(&self, _inputs: &[ScriptType], _outputs: &[ScriptType]) -> u64 {
            self.0
        }
    }

    fn txid(n: u8) -> TxId {
        TxId::from_internal_bytes([n; 32])
    }

    fn make_utxo(n: u8, amount: u64) -> ScriptedUnspentOutput {
        ScriptedUnspentOutput::new(
            UnspentOutput::new(100, txid(n), 0, amount),
            LockingScript::p2wpkh(&[0xAA; 20]),
        )
    }

    fn make_utxos(amounts: &[u64]) -> Vec<ScriptedUnspentOutput> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| make_utxo(i as u8, *a))
            .collect()
    }

    fn destination(amount: u64) -> Destination {
        Destination::new(LockingScript::p2pkh(&[0xBB; 20]), amount)
    }

    fn change_script() -> LockingScript {
        LockingScript::p2wpkh(&[0xAA; 20])
    }

    #[test]
    fn exact_fee_without_change() {
        let utxos = make_utxos(&[100_000, 200_000, 500_000]);
        let sizes = FixedSize(5_000);
        let selector = CoinSelector::new(&sizes, 100_000);

        let preimage = selector
            .select(
                &utxos,
                &destination(400_000),
                &change_script(),
                FeePolicy::Exactly { fee: 100_000 },
            )
            .unwrap();

        assert_eq!(preimage.inputs.len(), 1);
        assert_eq!(preimage.inputs[0].amount(), 500_000);
        assert_eq!(preimage.outputs.len(), 1);
        assert_eq!(preimage.destination_value(), 400_000);
        assert_eq!(preimage.fee, 100_000);
        assert_eq!(preimage.change(), 0);
        assert!(preimage.is_balanced());
    }

    #[test]
    fn sub_dust_change_goes_to_destination() {
        let utxos = make_utxos(&[100_000, 200_000, 500_000]);
        let sizes = FixedSize(5_000);
        let selector = CoinSelector::new(&sizes, 100_000);

        let preimage = selector
            .select(
                &utxos,
                &destination(400_000),
                &change_script(),
                FeePolicy::Calculate { fee_rate: 10 },
            )
            .unwrap();

        assert_eq!(preimage.inputs.len(), 1);
        assert_eq!(preimage.inputs[0].amount(), 500_000);
        assert_eq!(preimage.destination_value(), 450_000);
        assert_eq!(preimage.fee, 50_000);
        assert_eq!(preimage.change(), 0);
        assert!(preimage.is_balanced());
    }

    #[test]
    fn insufficient_funds() {
        let utxos = make_utxos(&[100_000, 200_000, 500_000]);
        let sizes = FixedSize(5_000);
        let selector = CoinSelector::new(&sizes, 100_000);

        for policy in [
            FeePolicy::Exactly { fee: 0 },
            FeePolicy::Calculate { fee_rate: 10 },
        ] {
            let result = selector.select(&utxos, &destination(900_000), &change_script(), policy);
            match result {
                Err(UtxoError::InsufficientFunds { available, .. }) => {
                    assert_eq!(available, 800_000)
                }
                other => panic!("expected InsufficientFunds, got: {other:?}"),
            }
        }
    }

    #[test]
    fn empty_set_is_insufficient() {
        let selector = CoinSelector::new(&VirtualSizeEstimator, 294);
        let result = selector.select(
            &[],
            &destination(1_000),
            &change_script(),
            FeePolicy::Exactly { fee: 0 },
        );
        assert_eq!(
            result,
            Err(UtxoError::InsufficientFunds {
                needed: 1_000,
                available: 0
            })
        );
    }

    #[test]
    fn change_output_when_leftover_is_large() {
        let utxos = make_utxos(&[1_000_000]);
        let selector = CoinSelector::new(&VirtualSizeEstimator, 294);

        let preimage = selector
            .select(
                &utxos,
                &destination(400_000),
                &change_script(),
                FeePolicy::Calculate { fee_rate: 2 },
            )
            .unwrap();

        // 1 P2WPKH input, P2PKH destination + P2WPKH change:
        // 40 + 2 + 272 + 136 + 124 = 574 wu -> 144 vB
        assert_eq!(preimage.fee, 288);
        assert_eq!(preimage.outputs.len(), 2);
        assert_eq!(preimage.destination_value(), 400_000);
        assert_eq!(preimage.change(), 1_000_000 - 400_000 - 288);
        assert!(preimage.outputs[1].is_change());
        assert!(preimage.is_balanced());
    }

    #[test]
    fn largest_first_ordering() {
        let utxos = make_utxos(&[1_000, 100_000, 50_000]);
        let selector = CoinSelector::new(&VirtualSizeEstimator, 294);

        let preimage = selector
            .select(
                &utxos,
                &destination(10_000),
                &change_script(),
                FeePolicy::Calculate { fee_rate: 1 },
            )
            .unwrap();

        assert_eq!(preimage.inputs.len(), 1);
        assert_eq!(preimage.inputs[0].output.txid, txid(1));
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let utxos = make_utxos(&[30_000, 30_000, 30_000]);
        let selector = CoinSelector::new(&VirtualSizeEstimator, 294);

        let preimage = selector
            .select(
                &utxos,
                &destination(55_000),
                &change_script(),
                FeePolicy::Calculate { fee_rate: 1 },
            )
            .unwrap();

        let ids: Vec<TxId> = preimage.inputs.iter().map(|i| i.output.txid).collect();
        assert_eq!(ids, vec![txid(0), txid(1)]);
    }

    #[test]
    fn fee_growth_pulls_in_another_input() {
        let utxos = make_utxos(&[50_000, 50_000]);
        let selector = CoinSelector::new(&VirtualSizeEstimator, 294);

        let low = selector
            .select(
                &utxos,
                &destination(40_000),
                &change_script(),
                FeePolicy::Calculate { fee_rate: 1 },
            )
            .unwrap();
        let high = selector
            .select(
                &utxos,
                &destination(40_000),
                &change_script(),
                FeePolicy::Calculate { fee_rate: 100 },
            )
            .unwrap();

        assert_eq!(low.inputs.len(), 1);
        assert_eq!(high.inputs.len(), 2);
    }

    #[test]
    fn spending_everything_sweeps_to_destination() {
        let utxos = make_utxos(&[1_200, 377]);
        let selector = CoinSelector::new(&VirtualSizeEstimator, 294);

        // Two P2WPKH inputs and one P2PKH output at 1 per vB:
        // 40 + 2 + 544 + 136 = 722 wu -> 181 vB
        let preimage = selector
            .select(
                &utxos,
                &destination(1_300),
                &change_script(),
                FeePolicy::Calculate { fee_rate: 1 },
            )
            .unwrap();

        assert_eq!(preimage.inputs.len(), 2);
        assert_eq!(preimage.fee, 181);
        assert_eq!(preimage.outputs.len(), 1);
        assert_eq!(preimage.destination_value(), 1_577 - 181);
        assert!(preimage.is_balanced());
    }

    #[test]
    fn selection_is_deterministic() {
        let utxos = make_utxos(&[7_000, 3_000, 9_000, 3_000, 12_000]);
        let selector = CoinSelector::new(&VirtualSizeEstimator, 294);
        let policy = FeePolicy::Calculate { fee_rate: 3 };

        let first = selector
            .select(&utxos, &destination(20_000), &change_script(), policy)
            .unwrap();
        let second = selector
            .select(&utxos, &destination(20_000), &change_script(), policy)
            .unwrap();
        assert_eq!(first, second);
    }

    /// Balance, dust and minimality over seeded random output sets.
    #[test]
    fn randomized_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let change_dust = 294;
        let dest_dust = 546;
        let selector = CoinSelector::new(&VirtualSizeEstimator, change_dust);
        let fees = FeeEstimator::new(&VirtualSizeEstimator);

        for _ in 0..500 {
            let count = rng.gen_range(1..=12);
            let amounts: Vec<u64> = (0..count).map(|_| rng.gen_range(100..=200_000)).collect();
            let utxos = make_utxos(&amounts);
            let amount = rng.gen_range(dest_dust..=400_000);
            let policy = if rng.gen_bool(0.5) {
                FeePolicy::Calculate {
                    fee_rate: rng.gen_range(0..=50),
                }
            } else {
                FeePolicy::Exactly {
                    fee: rng.gen_range(0..=5_000),
                }
            };

            let dest = destination(amount);
            let Ok(preimage) = selector.select(&utxos, &dest, &change_script(), policy) else {
                continue;
            };

            assert!(preimage.is_balanced(), "unbalanced: {preimage:?}");
            for output in &preimage.outputs {
                let dust = if output.is_change() { change_dust } else { dest_dust };
                assert!(output.value() >= dust, "dust output in {preimage:?}");
            }
            assert!(preimage.destination_value() >= amount);

            let types = vec![ScriptType::P2wpkh; preimage.inputs.len() - 1];
            let one_fewer_fee = fees.fee(policy, &types, &[ScriptType::P2pkh]);
            for skip in 0..preimage.inputs.len() {
                let rest: u64 = preimage
                    .inputs
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != skip)
                    .map(|(_, u)| u.amount())
                    .sum();
                assert!(
                    rest < amount + one_fewer_fee,
                    "input {skip} is redundant in {preimage:?}"
                );
            }
        }
    }
}
