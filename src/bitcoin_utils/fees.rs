//! Virtual-size and fee estimation
//!
//! Sizes are modelled rather than measured: the dominant input format of a
//! transaction selects a per-input/per-output/header cost table, one extra
//! output is always reserved for change, and any known witness bytes are added
//! with the segregated-witness discount.

use bitcoin::{psbt::Psbt, ScriptBuf};
use log::debug;

use crate::bitcoin_utils::keys::detect_script_format;
use crate::error::{Error, Result};
use crate::types::AddressFormat;

/// Base vbyte costs for one address format.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeTable {
    pub input: f64,
    pub output: f64,
    pub header: f64,
}

impl AddressFormat {
    pub fn size_table(self) -> SizeTable {
        match self {
            AddressFormat::Taproot => SizeTable { input: 57.5, output: 43.0, header: 10.5 },
            AddressFormat::Segwit => SizeTable { input: 68.0, output: 31.0, header: 10.5 },
            AddressFormat::NestedSegwit => SizeTable { input: 91.0, output: 32.0, header: 10.5 },
            AddressFormat::Legacy => SizeTable { input: 146.0, output: 33.0, header: 10.5 },
        }
    }
}

/// The format that sizes a transaction: taproot > nested-segwit > segwit > legacy.
pub fn dominant_format(input_types: &[AddressFormat]) -> Option<AddressFormat> {
    input_types.iter().copied().min_by_key(|f| f.fee_priority())
}

/// Estimate the virtual size of a transaction spending `input_types`.
///
/// `witness_lens` are byte lengths of witness material known up front (for
/// example an inscription leaf script); they only count for segwit formats.
pub fn estimate_virtual_size(
    input_types: &[AddressFormat],
    output_count: usize,
    witness_lens: &[usize],
) -> Result<u64> {
    let format = dominant_format(input_types).ok_or(Error::NoSpendableInputs)?;
    Ok(virtual_size_for(format, input_types.len(), output_count, witness_lens))
}

/// Size a transaction shape for an explicit format.
pub fn virtual_size_for(
    format: AddressFormat,
    input_count: usize,
    output_count: usize,
    witness_lens: &[usize],
) -> u64 {
    let table = format.size_table();
    let base = table.input * input_count as f64
        + table.output * (output_count + 1) as f64
        + table.header;
    let witness = if format.is_segwit() {
        witness_lens.iter().sum::<usize>() as f64
    } else {
        0.0
    };

    let weight = 3.0 * base + (base + witness);
    (weight / 4.0).ceil() as u64
}

pub fn estimate_fee(vbytes: u64, sats_per_vbyte: u64) -> u64 {
    vbytes.saturating_mul(sats_per_vbyte)
}

/// Classified shape of an existing PSBT.
#[derive(Clone, Debug, Default)]
pub struct PsbtComponents {
    pub inputs: Vec<AddressFormat>,
    /// `None` for outputs that are not standard wallet scripts (OP_RETURN, P2WSH, ...)
    pub outputs: Vec<Option<AddressFormat>>,
    pub witness_lens: Vec<usize>,
}

/// Classify every input of `psbt` by its prevout script.
pub fn analyze_psbt(psbt: &Psbt) -> Result<PsbtComponents> {
    let mut components = PsbtComponents::default();

    for (i, (txin, input)) in psbt.unsigned_tx.input.iter().zip(&psbt.inputs).enumerate() {
        let prevout_script: ScriptBuf = if let Some(utxo) = &input.witness_utxo {
            utxo.script_pubkey.clone()
        } else if let Some(prev) = &input.non_witness_utxo {
            prev.output
                .get(txin.previous_output.vout as usize)
                .map(|o| o.script_pubkey.clone())
                .ok_or_else(|| {
                    Error::PsbtDecode(format!("input {i}: non-witness utxo lacks the spent output"))
                })?
        } else {
            return Err(Error::PsbtDecode(format!("input {i}: prevout script not found")));
        };
        components.inputs.push(detect_script_format(&prevout_script)?);

        let leaf_bytes: usize = input
            .tap_scripts
            .iter()
            .map(|(control, (script, _))| control.size() + script.len())
            .sum();
        let witness_script = input.witness_script.as_ref().map_or(0, |s| s.len());
        components.witness_lens.push(leaf_bytes + witness_script);
    }

    for out in &psbt.unsigned_tx.output {
        components.outputs.push(detect_script_format(&out.script_pubkey).ok());
    }

    Ok(components)
}

/// Estimate the virtual size of an existing PSBT.
pub fn estimate_psbt_vsize(psbt: &Psbt) -> Result<u64> {
    let components = analyze_psbt(psbt)?;
    let vsize = estimate_virtual_size(
        &components.inputs,
        components.outputs.len(),
        &components.witness_lens,
    )?;
    debug!(
        "psbt sizing: {} inputs, {} outputs, {} vB",
        components.inputs.len(),
        components.outputs.len(),
        vsize
    );
    Ok(vsize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taproot_single_input_single_output() {
        // base = 57.5 + 43*2 + 10.5 = 154
        let vsize = estimate_virtual_size(&[AddressFormat::Taproot], 1, &[]).unwrap();
        assert_eq!(vsize, 154);
        assert_eq!(estimate_fee(vsize, 9), 1_386);
    }

    #[test]
    fn test_dominant_format_uses_priority() {
        let types = [AddressFormat::Legacy, AddressFormat::Segwit, AddressFormat::NestedSegwit];
        assert_eq!(dominant_format(&types), Some(AddressFormat::NestedSegwit));
        assert_eq!(dominant_format(&[]), None);

        // 3 inputs sized as nested-segwit: 91*3 + 32*3 + 10.5 = 379.5 -> 380
        assert_eq!(estimate_virtual_size(&types, 2, &[]).unwrap(), 380);
    }

    #[test]
    fn test_witness_only_counts_for_segwit() {
        let legacy = estimate_virtual_size(&[AddressFormat::Legacy], 1, &[400]).unwrap();
        let legacy_bare = estimate_virtual_size(&[AddressFormat::Legacy], 1, &[]).unwrap();
        assert_eq!(legacy, legacy_bare);

        let tr = estimate_virtual_size(&[AddressFormat::Taproot], 1, &[400]).unwrap();
        // weight grows by 400, vsize by 100
        assert_eq!(tr, 154 + 100);
    }

    #[test]
    fn test_monotonic_in_inputs_and_outputs() {
        for format in AddressFormat::ALL {
            let mut last = 0;
            for n in 1..20 {
                let v = virtual_size_for(format, n, 2, &[]);
                assert!(v >= last);
                last = v;
            }
            let mut last = 0;
            for m in 0..20 {
                let v = virtual_size_for(format, 2, m, &[]);
                assert!(v >= last);
                last = v;
            }
        }
    }

    #[test]
    fn test_no_inputs_cannot_be_sized() {
        assert!(estimate_virtual_size(&[], 3, &[]).is_err());
    }
}
