//! Balance command: classify every UTXO of a wallet key
use anyhow::*;

use crate::bitcoin_utils::keys::{parse_pubkey, StandardResolver};
use crate::types::{parse_formats, SafeMode};
use crate::wallet::{fetch_wallet, FetchOptions};

use super::{emit, ChainOpts};

#[derive(clap::Parser, Debug)]
pub struct BalanceOpts {
    #[command(flatten)] pub chain: ChainOpts,
    #[arg(long)] pub pubkey: String,
    /// Comma-separated formats, or `all`
    #[arg(long, default_value="all")] pub format: String,
    #[arg(long, default_value="on")] pub safe_mode: String,
    #[arg(long)] pub out: Option<String>,
}

pub fn run_balance(o: BalanceOpts) -> Result<()> {
    let (indexer, network) = o.chain.load()?;
    let pubkey = parse_pubkey(&o.pubkey)?;
    let formats = parse_formats(&o.format)?;
    let safe_mode: SafeMode = o.safe_mode.parse()?;

    let wallet = fetch_wallet(&StandardResolver, &indexer, &pubkey, network, &formats,
        &FetchOptions { safe_mode, ..Default::default() })?;

    for a in &wallet.addresses {
        match &a.notice {
            Some(notice) => eprintln!("  {:<14} {}  ({})", a.format, a.address, notice),
            None => eprintln!("  {:<14} {}  {} sats, {} spendable / {} unspendable",
                a.format, a.address, a.counters.satoshis, a.counters.spendable_count, a.counters.unspendable_count),
        }
    }
    eprintln!("Total: {} sats ({} cardinal), {} inscriptions",
        wallet.counters.satoshis, wallet.counters.cardinals, wallet.counters.inscriptions_count);

    emit(&o.out, &wallet)
}
