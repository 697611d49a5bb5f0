use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature as EcdsaSignature, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::UtxoError;
use crate::network::{NetworkParams, SighashFlavor};
use crate::preimage::PreImage;
use crate::script::{hash160, ScriptType};
use crate::utxo::{ScriptedUnspentOutput, TxId};

/// What the external signer returns for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSignature {
    /// ECDSA signature, either 64-byte compact `r || s` or DER.
    pub signature: Vec<u8>,
    /// SEC1 public key whose hash is committed to by the input's script.
    pub public_key: Vec<u8>,
}

/// Converts a [`PreImage`] into per-input signature digests and, given the
/// signatures, into a serialized transaction. Holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionEncoder;

impl TransactionEncoder {
    /// One digest per input, in `preimage.inputs` order.
    pub fn build_for_sign(
        &self,
        preimage: &PreImage,
        params: &NetworkParams,
    ) -> Result<Vec<[u8; 32]>, UtxoError> {
        validate(preimage, params)?;
        let tx = unsigned_transaction(preimage, params);
        digests(&tx, preimage, params)
    }

    /// Serialize the signed transaction ready for broadcast.
    ///
    /// `signatures` must match `preimage.inputs` one to one and in order;
    /// every signature is verified against its digest.
    pub fn build_for_send(
        &self,
        preimage: &PreImage,
        signatures: &[InputSignature],
        params: &NetworkParams,
    ) -> Result<Vec<u8>, UtxoError> {
        let tx = self.signed_transaction(preimage, signatures, params)?;
        Ok(bitcoin::consensus::serialize(&tx))
    }

    /// The id the signed transaction will have on chain.
    pub fn transaction_id(
        &self,
        preimage: &PreImage,
        signatures: &[InputSignature],
        params: &NetworkParams,
    ) -> Result<TxId, UtxoError> {
        let tx = self.signed_transaction(preimage, signatures, params)?;
        Ok(TxId::from_internal_bytes(tx.compute_txid().to_byte_array()))
    }

    fn signed_transaction(
        &self,
        preimage: &PreImage,
        signatures: &[InputSignature],
        params: &NetworkParams,
    ) -> Result<Transaction, UtxoError> {
        validate(preimage, params)?;
        if signatures.len() != preimage.inputs.len() {
            return Err(UtxoError::SignatureMismatch(format!(
                "expected {} signatures, got {}",
                preimage.inputs.len(),
                signatures.len()
            )));
        }

        let mut tx = unsigned_transaction(preimage, params);
        let digests = digests(&tx, preimage, params)?;
        let inputs = preimage.inputs.iter().zip(signatures).zip(&digests);
        for (index, ((input, signature), digest)) in inputs.enumerate() {
            let (script_sig, witness) = unlocking_for(input, signature, digest, params, index)?;
            tx.input[index].script_sig = script_sig;
            tx.input[index].witness = witness;
        }
        Ok(tx)
    }
}

fn validate(preimage: &PreImage, params: &NetworkParams) -> Result<(), UtxoError> {
    if preimage.inputs.is_empty() {
        return Err(UtxoError::InvalidAmount("pre-image spends no inputs".into()));
    }
    if preimage.outputs.is_empty() {
        return Err(UtxoError::InvalidDestination("pre-image has no outputs".into()));
    }
    if !preimage.is_balanced() {
        return Err(UtxoError::InvalidAmount(format!(
            "inputs {} do not equal outputs {} plus fee {}",
            preimage.input_total(),
            preimage.output_total(),
            preimage.fee
        )));
    }
    for input in &preimage.inputs {
        params.ensure_spendable(input.script_type())?;
    }
    for output in &preimage.outputs {
        params.dust(output.script().script_type())?;
    }
    Ok(())
}

/// The pre-image as a transaction with empty scriptSigs and witnesses.
fn unsigned_transaction(preimage: &PreImage, params: &NetworkParams) -> Transaction {
    let input = preimage
        .inputs
        .iter()
        .map(|input| TxIn {
            previous_output: OutPoint::new(
                Txid::from_byte_array(*input.output.txid.internal_bytes()),
                input.output.index,
            ),
            script_sig: ScriptBuf::new(),
            sequence: Sequence(params.sequence),
            witness: Witness::default(),
        })
        .collect();

    let output = preimage
        .outputs
        .iter()
        .map(|output| TxOut {
            value: Amount::from_sat(output.value()),
            script_pubkey: output.script().as_script_buf().clone(),
        })
        .collect();

    Transaction {
        version: Version(params.tx_version as i32),
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

fn digests(
    tx: &Transaction,
    preimage: &PreImage,
    params: &NetworkParams,
) -> Result<Vec<[u8; 32]>, UtxoError> {
    let mut cache = SighashCache::new(tx);
    let mut digests = Vec::with_capacity(preimage.inputs.len());

    for (index, input) in preimage.inputs.iter().enumerate() {
        let script = input.script.as_script_buf();
        let digest = match (params.sighash, input.script_type()) {
            (SighashFlavor::ForkId, _) => {
                forkid_sighash(tx, index, script, input.amount(), params.sighash_type)
            }
            (SighashFlavor::Legacy, ScriptType::P2wpkh) => {
                let sighash_type = EcdsaSighashType::from_standard(params.sighash_type)
                    .map_err(|e| UtxoError::InvalidConfig(e.to_string()))?;
                cache
                    .p2wpkh_signature_hash(
                        index,
                        script,
                        Amount::from_sat(input.amount()),
                        sighash_type,
                    )
                    .map_err(|e| UtxoError::TransactionBuild(format!("input {index}: {e}")))?
                    .to_byte_array()
            }
            (SighashFlavor::Legacy, _) => cache
                .legacy_signature_hash(index, script, params.sighash_type)
                .map_err(|e| UtxoError::TransactionBuild(format!("input {index}: {e}")))?
                .to_byte_array(),
        };
        digests.push(digest);
    }
    Ok(digests)
}

/// BIP-143 digest under the fork-id sighash type, used by replay-protected
/// forks for every input. `script_code` is the spent P2PKH script.
fn forkid_sighash(
    tx: &Transaction,
    index: usize,
    script_code: &ScriptBuf,
    value: u64,
    sighash_type: u32,
) -> [u8; 32] {
    let mut prevouts = Vec::with_capacity(36 * tx.input.len());
    let mut sequences = Vec::with_capacity(4 * tx.input.len());
    for txin in &tx.input {
        prevouts.extend(serialize(&txin.previous_output));
        sequences.extend(serialize(&txin.sequence.0));
    }
    let outputs: Vec<u8> = tx
        .output
        .iter()
        .flat_map(|txout| serialize(txout))
        .collect();

    let txin = &tx.input[index];
    let mut data = serialize(&tx.version.0);
    data.extend(sha256d::Hash::hash(&prevouts).as_byte_array());
    data.extend(sha256d::Hash::hash(&sequences).as_byte_array());
    data.extend(serialize(&txin.previous_output));
    data.extend(serialize(script_code));
    data.extend(serialize(&value));
    data.extend(serialize(&txin.sequence.0));
    data.extend(sha256d::Hash::hash(&outputs).as_byte_array());
    data.extend(serialize(&tx.lock_time.to_consensus_u32()));
    data.extend(serialize(&sighash_type));
    sha256d::Hash::hash(&data).to_byte_array()
}

/// Check `signature` against `digest` and build the input's scriptSig and
/// witness from it.
fn unlocking_for(
    input: &ScriptedUnspentOutput,
    signature: &InputSignature,
    digest: &[u8; 32],
    params: &NetworkParams,
    index: usize,
) -> Result<(ScriptBuf, Witness), UtxoError> {
    let script_type = input.script_type();
    let public_key = signature.public_key.as_slice();

    if script_type == ScriptType::P2wpkh && public_key.len() != 33 {
        return Err(UtxoError::SignatureMismatch(format!(
            "input {index}: witness inputs need a compressed public key"
        )));
    }
    if input.script.pubkey_hash() != Some(hash160(public_key)) {
        return Err(UtxoError::SignatureMismatch(format!(
            "input {index}: public key does not match the locking script"
        )));
    }
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key).map_err(|e| {
        UtxoError::SignatureMismatch(format!("input {index}: invalid public key: {e}"))
    })?;

    let parsed = if signature.signature.len() == 64 {
        EcdsaSignature::from_slice(&signature.signature)
    } else {
        EcdsaSignature::from_der(&signature.signature)
    }
    .map_err(|e| UtxoError::SignatureMismatch(format!("input {index}: invalid signature: {e}")))?;
    let parsed = parsed.normalize_s().unwrap_or(parsed);

    verifying_key.verify_prehash(digest, &parsed).map_err(|_| {
        UtxoError::SignatureMismatch(format!(
            "input {index}: signature does not verify against its digest"
        ))
    })?;

    // DER + sighash type byte
    let mut sig_bytes = parsed.to_der().as_bytes().to_vec();
    sig_bytes.push(params.sighash_byte());

    if script_type == ScriptType::P2wpkh {
        let mut witness = Witness::new();
        witness.push(&sig_bytes);
        witness.push(public_key);
        return Ok((ScriptBuf::new(), witness));
    }

    let script_sig = Builder::new()
        .push_slice(push_bytes(sig_bytes, index)?)
        .push_slice(push_bytes(public_key.to_vec(), index)?)
        .into_script();
    Ok((script_sig, Witness::new()))
}

fn push_bytes(data: Vec<u8>, index: usize) -> Result<PushBytesBuf, UtxoError> {
    PushBytesBuf::try_from(data)
        .map_err(|e| UtxoError::TransactionBuild(format!("input {index}: {e}")))
}
