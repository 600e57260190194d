//! Command handlers for each subcommand

pub mod balance;
pub mod inscribe;
pub mod mint;
pub mod send;
pub mod trade;

pub use balance::*;
pub use inscribe::*;
pub use mint::*;
pub use send::*;
pub use trade::*;

use anyhow::*;
use bitcoin::Network;
use serde::Serialize;

use crate::indexer::SnapshotIndexer;
use crate::types::parse_network;

/// Options shared by every command that reads chain state.
#[derive(clap::Args, Debug)]
pub struct ChainOpts {
    /// JSON chain snapshot served as the indexer
    #[arg(long)] pub snapshot: String,
    #[arg(long, default_value="mainnet")] pub network: String,
}

impl ChainOpts {
    pub fn load(&self) -> Result<(SnapshotIndexer, Network)> {
        let network = parse_network(&self.network)?;
        let json = std::fs::read_to_string(&self.snapshot)
            .with_context(|| format!("reading snapshot {}", self.snapshot))?;
        let indexer = SnapshotIndexer::from_json(&json)?;
        ensure!(indexer.network == network,
            "Snapshot network mismatch: snapshot has {}, you specified {}", indexer.network, self.network);
        eprintln!("Loaded snapshot {} ({} addresses, {} transactions)",
            self.snapshot, indexer.utxos.len(), indexer.transactions.len());
        Ok((indexer, network))
    }
}

/// Print `value` as JSON, or write it to `out` when given.
pub fn emit<T: Serialize>(out: &Option<String>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("Wrote {path}");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Accept either inline text or a path to a file holding it.
pub fn read_inline_or_file(s: &str) -> Result<String> {
    let path = std::path::Path::new(s);
    if path.is_file() {
        return std::fs::read_to_string(path).with_context(|| format!("reading {s}"));
    }
    Ok(s.to_string())
}
