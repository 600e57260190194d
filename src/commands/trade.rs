//! Sell and buy commands: the two halves of an instant trade
use anyhow::*;

use crate::bitcoin_utils::keys::StandardResolver;
use crate::trade::buyer::{create_buyer_psbt, BuyerConfig};
use crate::trade::seller::{create_seller_psbt, SellerConfig};
use crate::types::DEFAULT_FEE_RATE;

use super::{emit, read_inline_or_file, ChainOpts};

#[derive(clap::Parser, Debug)]
pub struct SellOpts {
    #[command(flatten)] pub chain: ChainOpts,
    #[arg(long)] pub pubkey: String,
    #[arg(long, default_value="taproot")] pub format: String,
    /// Outpoint (`txid:vout`) of the inscription being listed
    #[arg(long)] pub inscription: String,
    #[arg(long)] pub price: u64,
    /// Payment address; defaults to the seller's own address
    #[arg(long)] pub receive: Option<String>,
    #[arg(long)] pub out: Option<String>,
}

pub fn run_sell(o: SellOpts) -> Result<()> {
    let (indexer, network) = o.chain.load()?;
    let config = SellerConfig {
        pubkey: o.pubkey,
        network,
        format: o.format.parse()?,
        inscription_outpoint: o.inscription,
        price: o.price,
        receive_address: o.receive,
    };

    let built = create_seller_psbt(&StandardResolver, &indexer, &config)?;
    eprintln!("Built seller PSBT for {} at {} sats", config.inscription_outpoint, config.price);
    eprintln!("Sign input 0 with SIGHASH_SINGLE|ANYONECANPAY and hand the PSBT to the buyer");
    emit(&o.out, &built)
}

#[derive(clap::Parser, Debug)]
pub struct BuyOpts {
    #[command(flatten)] pub chain: ChainOpts,
    #[arg(long)] pub pubkey: String,
    #[arg(long, default_value="taproot")] pub format: String,
    /// Signed seller PSBT (hex or base64), inline or as a file path
    #[arg(long)] pub seller_psbt: String,
    /// Inscription destination; defaults to the buyer's own address
    #[arg(long)] pub receive: Option<String>,
    #[arg(long, default_value_t=DEFAULT_FEE_RATE)] pub fee_rate: u64,
    #[arg(long, default_value="on")] pub safe_mode: String,
    #[arg(long)] pub out: Option<String>,
}

pub fn run_buy(o: BuyOpts) -> Result<()> {
    let (indexer, network) = o.chain.load()?;
    let config = BuyerConfig {
        pubkey: o.pubkey,
        network,
        format: o.format.parse()?,
        seller_psbt: read_inline_or_file(&o.seller_psbt)?,
        receive_address: o.receive,
        fee_rate: o.fee_rate,
        safe_mode: o.safe_mode.parse()?,
    };

    let built = create_buyer_psbt(&StandardResolver, &indexer, &config)
        .context("building buyer PSBT (run `dummies` first if the wallet has no dummy UTXOs)")?;
    eprintln!("Built buyer PSBT: {} inputs, {} outputs, fee {} sats",
        built.psbt.inputs.len(), built.psbt.outputs.len(), built.fee);
    emit(&o.out, &built)
}
