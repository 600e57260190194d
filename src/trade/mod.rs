//! Instant trades: atomic inscription-for-payment swaps
//!
//! The seller signs one input (the inscription) and one output (price +
//! postage to themselves) with `SINGLE|ANYONECANPAY`. The buyer builds the
//! rest of the transaction around that pair:
//!
//! ```text
//! inputs:  [dummy 0] [dummy 1] [seller inscription] [buyer funding...]
//! outputs: [dummy merge] [inscription to buyer] [seller payment] [change]
//! ```
//!
//! The seller pair always sits at index [`SELLER_SLOT`] so the seller's
//! signature, which commits to its own index, stays valid.

pub mod buyer;
pub mod seller;

use bitcoin::psbt::Psbt;
use log::debug;

use crate::bitcoin_utils::keys::detect_script_format;
use crate::bitcoin_utils::psbt::BoundInput;
use crate::builder::{DraftOutput, TxDraft};
use crate::error::{Error, Result};
use crate::types::SELLER_SLOT;

/// The seller's signed input and its paired output, lifted out of their PSBT.
#[derive(Clone, Debug)]
pub struct SellerPair {
    pub input: BoundInput,
    pub output: DraftOutput,
}

impl SellerPair {
    /// Extract the pair from a seller PSBT, which must hold exactly one of each.
    pub fn from_psbt(psbt: &Psbt) -> Result<Self> {
        let tx = &psbt.unsigned_tx;
        if tx.input.len() != 1 || tx.output.len() != 1 {
            return Err(Error::InvalidSellerPsbt(format!(
                "expected 1 input and 1 output, found {} and {}",
                tx.input.len(),
                tx.output.len()
            )));
        }
        let txin = tx.input[0].clone();
        let psbt_input = psbt.inputs[0].clone();

        let prevout = match (&psbt_input.witness_utxo, &psbt_input.non_witness_utxo) {
            (Some(utxo), _) => utxo.clone(),
            (None, Some(prev)) => prev
                .output
                .get(txin.previous_output.vout as usize)
                .cloned()
                .ok_or_else(|| Error::InvalidSellerPsbt("previous transaction lacks the spent output".into()))?,
            (None, None) => return Err(Error::InvalidSellerPsbt("input carries no previous output".into())),
        };
        let format = detect_script_format(&prevout.script_pubkey)
            .map_err(|e| Error::InvalidSellerPsbt(e.to_string()))?;

        Ok(SellerPair {
            input: BoundInput {
                txin,
                psbt_input,
                value: prevout.value.to_sat(),
                format,
            },
            output: DraftOutput {
                txout: tx.output[0].clone(),
                psbt_output: psbt.outputs[0].clone(),
            },
        })
    }
}

/// Splice the seller pair into `draft` at [`SELLER_SLOT`].
///
/// The draft must already hold at least `SELLER_SLOT` inputs and outputs. An
/// occupied slot is overwritten; otherwise the pair is appended, which lands it
/// exactly on the slot.
pub fn merge_seller_psbt(draft: &mut TxDraft, pair: SellerPair) -> Result<()> {
    if draft.inputs.len() < SELLER_SLOT || draft.outputs.len() < SELLER_SLOT {
        return Err(Error::InvalidSellerPsbt(format!(
            "buyer draft needs {SELLER_SLOT} inputs and outputs before merging, has {} and {}",
            draft.inputs.len(),
            draft.outputs.len()
        )));
    }
    debug!(
        "merging seller input {} at slot {}",
        pair.input.txin.previous_output, SELLER_SLOT
    );
    place(&mut draft.inputs, pair.input);
    place(&mut draft.outputs, pair.output);
    Ok(())
}

fn place<T>(items: &mut Vec<T>, item: T) {
    if items.len() > SELLER_SLOT {
        items[SELLER_SLOT] = item;
    } else {
        items.push(item);
    }
}
