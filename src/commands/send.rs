//! Send and dummy-UTXO commands: standard wallet PSBTs
use anyhow::*;

use crate::bitcoin_utils::keys::StandardResolver;
use crate::builder::dummy::{create_dummy_utxos, DummyUtxoConfig};
use crate::builder::transfer::{create_transfer_psbt, InputRequest, OutputRequest, TransferConfig};
use crate::types::{parse_formats, DEFAULT_DUMMY_VALUE, DEFAULT_FEE_RATE, DUMMY_INPUTS};

use super::{emit, ChainOpts};

#[derive(clap::Parser, Debug)]
pub struct SendOpts {
    #[command(flatten)] pub chain: ChainOpts,
    #[arg(long)] pub pubkey: String,
    #[arg(long, default_value="all")] pub format: String,
    /// Input address to spend from; repeatable, `any` picks the first funded address
    #[arg(long="input", default_value="any")] pub inputs: Vec<String>,
    /// Output as `address:sats`; repeatable
    #[arg(long="output", required=true)] pub outputs: Vec<String>,
    #[arg(long, default_value_t=DEFAULT_FEE_RATE)] pub fee_rate: u64,
    #[arg(long, default_value="on")] pub safe_mode: String,
    #[arg(long)] pub out: Option<String>,
}

fn parse_output(s: &str) -> Result<OutputRequest> {
    let (address, value) = s.rsplit_once(':').context("--output must be address:sats")?;
    let value = value.parse().with_context(|| format!("bad output value in {s}"))?;
    Ok(OutputRequest { address: address.to_string(), value })
}

pub fn run_send(o: SendOpts) -> Result<()> {
    let (indexer, network) = o.chain.load()?;
    let config = TransferConfig {
        pubkey: o.pubkey,
        network,
        formats: parse_formats(&o.format)?,
        inputs: o.inputs.into_iter().map(|address| InputRequest { address }).collect(),
        outputs: o.outputs.iter().map(|s| parse_output(s)).collect::<Result<_>>()?,
        fee_rate: o.fee_rate,
        safe_mode: o.safe_mode.parse()?,
    };

    let built = create_transfer_psbt(&StandardResolver, &indexer, &config)?;
    eprintln!("Built transfer PSBT: {} inputs, {} outputs, fee {} sats ({} vB)",
        built.psbt.inputs.len(), built.psbt.outputs.len(), built.fee, built.virtual_size);
    if !built.unsupported_inputs.is_empty() {
        eprintln!("Skipped {} unsupported UTXO(s)", built.unsupported_inputs.len());
    }
    emit(&o.out, &built)
}

#[derive(clap::Parser, Debug)]
pub struct DummiesOpts {
    #[command(flatten)] pub chain: ChainOpts,
    #[arg(long)] pub pubkey: String,
    #[arg(long, default_value="taproot")] pub format: String,
    #[arg(long, default_value_t=DEFAULT_DUMMY_VALUE)] pub value: u64,
    #[arg(long, default_value_t=DUMMY_INPUTS)] pub count: usize,
    #[arg(long, default_value_t=DEFAULT_FEE_RATE)] pub fee_rate: u64,
    #[arg(long)] pub out: Option<String>,
}

pub fn run_dummies(o: DummiesOpts) -> Result<()> {
    let (indexer, network) = o.chain.load()?;
    let mut config = DummyUtxoConfig::new(o.pubkey, network);
    config.format = o.format.parse()?;
    config.value = o.value;
    config.count = o.count;
    config.fee_rate = o.fee_rate;

    let built = create_dummy_utxos(&StandardResolver, &indexer, &config)?;
    eprintln!("Built dummy PSBT: {} x {} sats, fee {} sats", config.count, config.value, built.fee);
    emit(&o.out, &built)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        let out = parse_output("bcrt1qexample:1200").unwrap();
        assert_eq!(out.address, "bcrt1qexample");
        assert_eq!(out.value, 1_200);
        assert!(parse_output("no-value").is_err());
        assert!(parse_output("addr:-5").is_err());
    }
}
