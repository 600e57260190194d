//! PSBT construction driver
//!
//! Every PSBT this crate produces goes through [`prepare`]: a role-specific
//! [`BuildStrategy`] fills a [`TxDraft`] with outputs and inputs, then the
//! driver sizes the fee, resolves change and serializes the result. A build
//! runs the stages
//!
//! `Init → InputsSelected → FeeComputed → ChangeResolved → Finalized`
//!
//! in order, logging each transition at `debug`. The draft is owned by a
//! single build; nothing here is shared across calls.

pub mod dummy;
pub mod transfer;

use bitcoin::{
    absolute::LockTime,
    psbt::{self, Psbt},
    transaction::Version,
    Amount, ScriptBuf, Transaction, TxOut,
};
use log::{debug, info};
use serde::Serialize;

use crate::bitcoin_utils::fees::{dominant_format, estimate_fee, estimate_virtual_size};
use crate::bitcoin_utils::psbt::{encode_psbt, Binding, BoundInput, InputBinder, SighashPolicy};
use crate::error::{Error, Result};
use crate::indexer::ChainIndexer;
use crate::types::{sum_sats, AddressFormat, Utxo, DUST_THRESHOLD};

#[derive(Clone, Debug)]
pub struct DraftOutput {
    pub txout: TxOut,
    pub psbt_output: psbt::Output,
}

impl DraftOutput {
    pub fn new(script_pubkey: ScriptBuf, value: u64) -> Self {
        Self {
            txout: TxOut {
                value: Amount::from_sat(value),
                script_pubkey,
            },
            psbt_output: psbt::Output::default(),
        }
    }

    pub fn value(&self) -> u64 {
        self.txout.value.to_sat()
    }
}

/// Transaction under construction.
#[derive(Clone, Debug)]
pub struct TxDraft {
    pub inputs: Vec<BoundInput>,
    pub outputs: Vec<DraftOutput>,
    pub fee_rate: u64,
    pub dominant_format: Option<AddressFormat>,
    /// Byte lengths of witness material known before signing
    pub witness_lens: Vec<usize>,
    /// UTXOs dropped because they could not be bound
    pub unsupported: Vec<String>,
    pub fee: u64,
    pub change: Option<u64>,
}

impl TxDraft {
    pub fn new(fee_rate: u64) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            fee_rate,
            dominant_format: None,
            witness_lens: Vec::new(),
            unsupported: Vec::new(),
            fee: 0,
            change: None,
        }
    }

    pub fn total_input_sats(&self) -> Result<u64> {
        sum_sats("input total", self.inputs.iter().map(|i| i.value))
    }

    pub fn total_output_sats(&self) -> Result<u64> {
        sum_sats("output total", self.outputs.iter().map(DraftOutput::value))
    }

    pub fn input_formats(&self) -> Vec<AddressFormat> {
        self.inputs.iter().map(|i| i.format).collect()
    }

    pub fn push_output(&mut self, script_pubkey: ScriptBuf, value: u64) {
        self.outputs.push(DraftOutput::new(script_pubkey, value));
    }

    /// Add a binding result; unsupported UTXOs are recorded and skipped.
    pub fn accept(&mut self, binding: Binding) -> bool {
        match binding {
            Binding::Bound(input) => {
                self.inputs.push(*input);
                true
            }
            Binding::Unsupported(reason) => {
                self.unsupported.push(reason);
                false
            }
        }
    }

    /// Bind and add every UTXO in `utxos`, returning how many were added.
    pub fn bind_all<'u, I: ChainIndexer>(
        &mut self,
        binder: &InputBinder<'_, I>,
        utxos: impl IntoIterator<Item = &'u Utxo>,
        sighash: SighashPolicy,
    ) -> Result<usize> {
        let mut added = 0;
        for utxo in utxos {
            if self.inputs.iter().any(|i| i.txin.previous_output == utxo.outpoint()) {
                continue;
            }
            if self.accept(binder.bind_utxo(utxo, sighash)?) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Fee for the current inputs with `output_count` outputs at the draft's rate.
    pub fn fee_for(&self, output_count: usize) -> Result<u64> {
        let vsize = estimate_virtual_size(&self.input_formats(), output_count, &self.witness_lens)?;
        Ok(estimate_fee(vsize, self.fee_rate))
    }

    pub fn to_psbt(&self) -> Result<Psbt> {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: self.inputs.iter().map(|i| i.txin.clone()).collect(),
            output: self.outputs.iter().map(|o| o.txout.clone()).collect(),
        };
        let mut psbt = Psbt::from_unsigned_tx(tx)?;
        for (slot, input) in psbt.inputs.iter_mut().zip(&self.inputs) {
            *slot = input.psbt_input.clone();
        }
        for (slot, output) in psbt.outputs.iter_mut().zip(&self.outputs) {
            *slot = output.psbt_output.clone();
        }
        Ok(psbt)
    }
}

/// Role-specific part of a build.
pub trait BuildStrategy {
    fn select_outputs(&mut self, draft: &mut TxDraft) -> Result<()>;

    fn select_inputs(&mut self, draft: &mut TxDraft) -> Result<()>;

    /// Destination for change. `None` folds any surplus into the fee.
    fn change_script(&self, draft: &TxDraft) -> Result<Option<ScriptBuf>>;

    /// Output count the fee is sized for.
    fn fee_output_count(&self, draft: &TxDraft) -> usize {
        draft.outputs.len()
    }

    /// False for roles whose outputs are funded by a counterparty.
    fn funded_by_inputs(&self) -> bool {
        true
    }
}

/// A finished, unsigned PSBT.
#[derive(Clone, Debug, Serialize)]
pub struct BuiltPsbt {
    #[serde(skip)]
    pub psbt: Psbt,
    pub hex: String,
    pub base64: String,
    pub fee: u64,
    pub virtual_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unsupported_inputs: Vec<String>,
}

/// Run `strategy` through every build stage.
pub fn prepare<S: BuildStrategy + ?Sized>(strategy: &mut S, fee_rate: u64) -> Result<BuiltPsbt> {
    let mut draft = TxDraft::new(fee_rate);

    strategy.select_outputs(&mut draft)?;
    strategy.select_inputs(&mut draft)?;
    if draft.inputs.is_empty() {
        return Err(match draft.unsupported.len() {
            0 => Error::NoSpendableInputs,
            n => Error::NoUsableInputs(n),
        });
    }
    let available = draft.total_input_sats()?;
    debug!(
        "inputs selected: {} bound, {} unsupported, {} sats",
        draft.inputs.len(),
        draft.unsupported.len(),
        available
    );

    let formats = draft.input_formats();
    draft.dominant_format = dominant_format(&formats);
    let virtual_size = estimate_virtual_size(&formats, strategy.fee_output_count(&draft), &draft.witness_lens)?;
    draft.fee = estimate_fee(virtual_size, draft.fee_rate);
    debug!(
        "fee computed: {} vB at {} sat/vB = {} sats ({:?} sized)",
        virtual_size, draft.fee_rate, draft.fee, draft.dominant_format
    );

    if strategy.funded_by_inputs() {
        let needed = draft
            .total_output_sats()?
            .checked_add(draft.fee)
            .ok_or_else(|| Error::InvalidConfig("outputs plus fee overflow".into()))?;
        if available < needed {
            return Err(Error::InsufficientFunds { needed, available });
        }
        let change = available - needed;
        if change >= DUST_THRESHOLD {
            if let Some(script) = strategy.change_script(&draft)? {
                draft.push_output(script, change);
                draft.change = Some(change);
            }
        }
        if draft.change.is_none() {
            debug!("{change} sats of change folded into the fee");
            draft.fee += change;
        }
    }
    debug!("change resolved: {:?}", draft.change);

    let psbt = draft.to_psbt()?;
    let encoded = encode_psbt(&psbt);
    info!(
        "built psbt: {} inputs, {} outputs, fee {} sats",
        psbt.inputs.len(),
        psbt.outputs.len(),
        draft.fee
    );

    Ok(BuiltPsbt {
        psbt,
        hex: encoded.hex,
        base64: encoded.base64,
        fee: draft.fee,
        virtual_size,
        change: draft.change,
        unsupported_inputs: draft.unsupported,
    })
}
