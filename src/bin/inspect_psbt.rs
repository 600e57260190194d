//! PSBT inspection tool
//!
//! Decodes a PSBT (hex or base64) and reports:
//! - Each input's outpoint, value, address format and sighash type
//! - Each output's value, format and address
//! - Estimated virtual size, and fee at `--fee-rate` when given
//! - Whether slot 2 carries a SINGLE|ANYONECANPAY seller commitment

use anyhow::*;
use bitcoin::{sighash::EcdsaSighashType, Address, Network};
use serde_json::json;
use std::fs;

use ordkit::bitcoin_utils::fees::{analyze_psbt, estimate_fee, estimate_psbt_vsize};
use ordkit::bitcoin_utils::psbt::decode_psbt;
use ordkit::types::{parse_network, SELLER_SLOT};

/// CLI: `cargo run --bin inspect_psbt -- --psbt trade.psbt`
#[derive(clap::Parser, Debug)]
struct Opts {
    /// PSBT as hex/base64, or a path to a file holding it
    #[arg(long)]
    psbt: String,

    #[arg(long, default_value = "mainnet")]
    network: String,

    /// Also print the fee the estimated size costs at this rate
    #[arg(long)]
    fee_rate: Option<u64>,
}

const SINGLE_ANYONECANPAY: u32 = EcdsaSighashType::SinglePlusAnyoneCanPay as u32;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let opts = <Opts as clap::Parser>::parse();

    let raw = match fs::read_to_string(&opts.psbt) {
        std::result::Result::Ok(s) => s,
        Err(_) => opts.psbt.clone(),
    };
    let psbt = decode_psbt(&raw)?;
    let network: Network = parse_network(&opts.network)?;
    let components = analyze_psbt(&psbt)?;

    eprintln!("=== PSBT Inspection ===\n");
    eprintln!("Inputs: {}", psbt.inputs.len());

    let mut inputs = Vec::new();
    for (i, (txin, input)) in psbt.unsigned_tx.input.iter().zip(&psbt.inputs).enumerate() {
        let value = match (&input.witness_utxo, &input.non_witness_utxo) {
            (Some(utxo), _) => utxo.value.to_sat(),
            (None, Some(prev)) => prev
                .output
                .get(txin.previous_output.vout as usize)
                .map(|o| o.value.to_sat())
                .context("non-witness UTXO lacks the spent output")?,
            (None, None) => bail!("input {i} has no previous output"),
        };
        let sighash = input.sighash_type.map(|s| s.to_u32());
        eprintln!(
            "  [{i}] {} {:>12} sats  {:<14} sighash={}",
            txin.previous_output,
            value,
            components.inputs[i],
            sighash.map_or("default".to_string(), |s| format!("{s:#04x}"))
        );
        inputs.push(json!({
            "outpoint": txin.previous_output.to_string(),
            "value": value,
            "format": components.inputs[i],
            "sighash": sighash,
        }));
    }

    eprintln!("\nOutputs: {}", psbt.outputs.len());
    let mut outputs = Vec::new();
    for (i, out) in psbt.unsigned_tx.output.iter().enumerate() {
        let address = Address::from_script(&out.script_pubkey, network)
            .map(|a| a.to_string())
            .unwrap_or_else(|_| format!("script:{}", out.script_pubkey.to_hex_string()));
        let format = components.outputs[i];
        eprintln!(
            "  [{i}] {:>12} sats  {:<14} {}",
            out.value.to_sat(),
            format.map_or("nonstandard".to_string(), |f| f.to_string()),
            address
        );
        outputs.push(json!({ "value": out.value.to_sat(), "format": format, "address": address }));
    }

    let vsize = estimate_psbt_vsize(&psbt)?;
    eprintln!("\nEstimated size: {vsize} vB");
    let fee = opts.fee_rate.map(|rate| estimate_fee(vsize, rate));
    if let (Some(rate), Some(fee)) = (opts.fee_rate, fee) {
        eprintln!("Fee at {rate} sat/vB: {fee} sats");
    }

    let seller_slot = psbt.inputs.get(SELLER_SLOT).is_some_and(|input| {
        input.sighash_type.map(|s| s.to_u32()) == Some(SINGLE_ANYONECANPAY)
    }) && psbt.outputs.len() > SELLER_SLOT;
    if seller_slot {
        eprintln!("✓ Slot {SELLER_SLOT} carries a SINGLE|ANYONECANPAY seller commitment");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "txid": psbt.unsigned_tx.compute_txid().to_string(),
            "inputs": inputs,
            "outputs": outputs,
            "virtualSize": vsize,
            "fee": fee,
            "sellerSlot": seller_slot,
        }))?
    );
    Ok(())
}
