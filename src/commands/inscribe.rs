//! Inscribe and publish commands: commit address, then reveal PSBT
use anyhow::*;
use serde_json::{json, Value};

use crate::collection::{publish_collection, PublishParams};
use crate::inscription::{Inscriber, InscriptionConfig};
use crate::types::{parse_network, parse_outpoint, DEFAULT_FEE_RATE, DEFAULT_POSTAGE};

use super::{emit, read_inline_or_file};

/// Envelope and funding options shared by every inscribing command.
#[derive(clap::Args, Debug)]
pub struct EnvelopeOpts {
    #[arg(long)] pub pubkey: String,
    #[arg(long, default_value="mainnet")] pub network: String,
    #[arg(long, default_value="text/plain;charset=utf-8")] pub media_type: String,
    /// Content: UTF-8 text for text/* types, base64 otherwise; inline or a file path
    #[arg(long)] pub content: String,
    #[arg(long, default_value_t=DEFAULT_POSTAGE)] pub postage: u64,
    #[arg(long, default_value_t=DEFAULT_FEE_RATE)] pub fee_rate: u64,
    #[arg(long)] pub destination: Option<String>,
    #[arg(long)] pub change: Option<String>,
    /// Funded commit output (`txid:vout`); when given, a reveal PSBT is built
    #[arg(long)] pub commit_outpoint: Option<String>,
    #[arg(long)] pub commit_value: Option<u64>,
}

impl EnvelopeOpts {
    pub fn config(&self, meta: Option<Value>, encode_meta: bool) -> Result<InscriptionConfig> {
        let mut config = InscriptionConfig::new(
            self.pubkey.clone(), parse_network(&self.network)?, &self.media_type, &read_inline_or_file(&self.content)?);
        config.meta = meta;
        config.encode_meta = encode_meta;
        config.postage = self.postage;
        config.fee_rate = self.fee_rate;
        config.destination = self.destination.clone();
        config.change_address = self.change.clone();
        Ok(config)
    }
}

/// Print the commit address, or the reveal PSBT once the commit is funded.
pub fn commit_or_reveal(opts: &EnvelopeOpts, config: &InscriptionConfig, out: &Option<String>, extra: Value) -> Result<()> {
    let inscriber = Inscriber::new(config)?;
    let commit = inscriber.commit()?;

    match (&opts.commit_outpoint, opts.commit_value) {
        (Some(outpoint), Some(value)) => {
            let outpoint = parse_outpoint(outpoint)?;
            ensure!(value >= commit.required_value,
                "Commit output holds {} sats, reveal needs {}", value, commit.required_value);
            let built = inscriber.build_reveal_psbt(outpoint, value)?;
            eprintln!("Built reveal PSBT spending {}: fee {} sats", outpoint, built.fee);
            emit(out, &json!({ "commit": commit, "reveal": built, "meta": extra }))
        }
        (None, None) => {
            eprintln!("Commit address: {}", commit.address);
            eprintln!("Fund it with at least {} sats, then rerun with --commit-outpoint and --commit-value",
                commit.required_value);
            emit(out, &json!({ "commit": commit, "meta": extra }))
        }
        _ => bail!("--commit-outpoint and --commit-value go together"),
    }
}

#[derive(clap::Parser, Debug)]
pub struct InscribeOpts {
    #[command(flatten)] pub envelope: EnvelopeOpts,
    /// JSON metadata, inline or a file path
    #[arg(long)] pub meta: Option<String>,
    /// URI-encode string values of the metadata
    #[arg(long)] pub encode_meta: bool,
    /// Compile a bare key-spend recovery leaf instead of the envelope
    #[arg(long)] pub recover: bool,
    #[arg(long)] pub out: Option<String>,
}

pub fn run_inscribe(o: InscribeOpts) -> Result<()> {
    let meta: Option<Value> = match &o.meta {
        Some(m) => Some(serde_json::from_str(&read_inline_or_file(m)?).context("parsing --meta")?),
        None => None,
    };
    let mut config = o.envelope.config(meta.clone(), o.encode_meta)?;
    config.recover = o.recover;
    commit_or_reveal(&o.envelope, &config, &o.out, meta.unwrap_or(Value::Null))
}

#[derive(clap::Parser, Debug)]
pub struct PublishOpts {
    #[command(flatten)] pub envelope: EnvelopeOpts,
    /// Collection description JSON (title, slug, publishers, inscriptions, ...), inline or a file path
    #[arg(long)] pub params: String,
    #[arg(long)] pub out: Option<String>,
}

pub fn run_publish(o: PublishOpts) -> Result<()> {
    let params: PublishParams = serde_json::from_str(&read_inline_or_file(&o.params)?)
        .context("parsing --params")?;
    let collection = publish_collection(params)?;
    eprintln!("Collection {}: {} inscriptions, {} publishers",
        collection.slug, collection.insc.len(), collection.publ.len());

    let meta = collection.to_value()?;
    let config = o.envelope.config(Some(meta.clone()), false)?;
    commit_or_reveal(&o.envelope, &config, &o.out, meta)
}
