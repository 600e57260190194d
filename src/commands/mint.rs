//! Mint command: authorize a collection mint, then inscribe it
use anyhow::*;

use crate::collection::{authorize_mint, MintRequest};
use crate::indexer::SnapshotIndexer;
use crate::types::parse_network;

use super::{commit_or_reveal, read_inline_or_file, EnvelopeOpts};

#[derive(clap::Parser, Debug)]
pub struct MintOpts {
    #[command(flatten)] pub envelope: EnvelopeOpts,
    /// JSON chain snapshot holding the collection inscription
    #[arg(long)] pub snapshot: String,
    /// Mint request JSON (collectionOutpoint, inscriptionIid, publisherIndex, nonce, signature, traits)
    #[arg(long)] pub request: String,
    #[arg(long)] pub out: Option<String>,
}

pub fn run_mint(o: MintOpts) -> Result<()> {
    let network = parse_network(&o.envelope.network)?;
    let indexer = SnapshotIndexer::from_json(&std::fs::read_to_string(&o.snapshot)?)?;
    let request: MintRequest = serde_json::from_str(&read_inline_or_file(&o.request)?)
        .context("parsing --request")?;

    let mint = authorize_mint(&indexer, network, &request)?;
    eprintln!("Mint authorized: {} #{} of {}", mint.iid, mint.nonce, mint.col);

    let meta = mint.to_value()?;
    let config = o.envelope.config(Some(meta.clone()), false)?;
    commit_or_reveal(&o.envelope, &config, &o.out, meta)
}
