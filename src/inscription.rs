//! Inscription commit/reveal flow
//!
//! 1. [`Inscriber::commit`] compiles the envelope and returns the taproot
//!    commit address plus how much it must be funded with.
//! 2. Once a commit output exists, [`Inscriber::build_reveal_psbt`] spends it
//!    through the envelope leaf, which puts the content on chain and sends the
//!    inscribed postage to its destination.

use bitcoin::{
    taproot::LeafVersion, Amount, Network, OutPoint, PublicKey, ScriptBuf, TxIn, TxOut, Witness,
    XOnlyPublicKey,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bitcoin_utils::fees::{estimate_fee, virtual_size_for};
use crate::bitcoin_utils::keys::{derive_address, parse_address, parse_pubkey, to_x_only};
use crate::bitcoin_utils::psbt::BoundInput;
use crate::bitcoin_utils::tapscript::{
    build_witness_script, commit_fee, encode_metadata, CommitTree, InscriptionContent,
};
use crate::builder::transfer::{default_fee_rate, default_network};
use crate::builder::{prepare, BuildStrategy, BuiltPsbt, TxDraft};
use crate::error::{Error, Result};
use crate::types::{check_amount, AddressFormat, DEFAULT_POSTAGE, DUST_THRESHOLD, RBF_SEQUENCE};

fn default_postage() -> u64 {
    DEFAULT_POSTAGE
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InscriptionConfig {
    /// Hex public key whose x-only form becomes the internal key
    pub pubkey: String,
    #[serde(default = "default_network")]
    pub network: Network,
    pub media_type: String,
    pub media_content: String,
    #[serde(default)]
    pub meta: Option<Value>,
    /// URI-encode every string in `meta` before embedding it
    #[serde(default)]
    pub encode_meta: bool,
    #[serde(default = "default_postage")]
    pub postage: u64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
    /// Receives the inscription; defaults to the key's taproot address
    #[serde(default)]
    pub destination: Option<String>,
    /// Receives reveal change; defaults to the key's taproot address
    #[serde(default)]
    pub change_address: Option<String>,
    /// Compile a bare `<key> OP_CHECKSIG` leaf instead of the envelope
    #[serde(default)]
    pub recover: bool,
}

impl InscriptionConfig {
    pub fn new(pubkey: impl Into<String>, network: Network, media_type: &str, media_content: &str) -> Self {
        Self {
            pubkey: pubkey.into(),
            network,
            media_type: media_type.to_string(),
            media_content: media_content.to_string(),
            meta: None,
            encode_meta: false,
            postage: DEFAULT_POSTAGE,
            fee_rate: default_fee_rate(),
            destination: None,
            change_address: None,
            recover: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fee_rate == 0 {
            return Err(Error::InvalidConfig("fee rate must be positive".into()));
        }
        if self.postage < DUST_THRESHOLD {
            return Err(Error::InvalidConfig(format!(
                "postage must be at least {DUST_THRESHOLD} sats"
            )));
        }
        check_amount("postage", self.postage)?;
        Ok(())
    }
}

/// Commit address and funding requirements.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub address: String,
    /// Reveal allowance priced from the script length
    pub fees: u64,
    /// Reveal fee from the size model
    pub reveal_fee: u64,
    /// Minimum value the commit output must carry
    pub required_value: u64,
    pub script_hex: String,
}

pub struct Inscriber {
    network: Network,
    internal_key: XOnlyPublicKey,
    postage: u64,
    fee_rate: u64,
    tree: CommitTree,
    destination: ScriptBuf,
    change: ScriptBuf,
}

impl Inscriber {
    pub fn new(config: &InscriptionConfig) -> Result<Self> {
        config.validate()?;
        let pubkey: PublicKey = parse_pubkey(&config.pubkey)?;
        let internal_key = to_x_only(&pubkey);

        let meta = match (&config.meta, config.encode_meta) {
            (Some(meta), true) => Some(encode_metadata(meta)?),
            (meta, false) => meta.clone(),
            (None, true) => None,
        };
        let content = InscriptionContent {
            media_type: config.media_type.clone(),
            media_content: config.media_content.clone(),
            meta,
        };
        let script = build_witness_script(&internal_key, &content, config.recover)?;
        let tree = CommitTree::new(internal_key, script)?;

        let own = derive_address(&pubkey, config.network, AddressFormat::Taproot)?.address.script_pubkey();
        let resolve = |address: &Option<String>| -> Result<ScriptBuf> {
            match address {
                Some(a) => Ok(parse_address(a, config.network)?.script_pubkey()),
                None => Ok(own.clone()),
            }
        };

        Ok(Self {
            network: config.network,
            internal_key,
            postage: config.postage,
            fee_rate: config.fee_rate,
            destination: resolve(&config.destination)?,
            change: resolve(&config.change_address)?,
            tree,
        })
    }

    pub fn script(&self) -> &ScriptBuf {
        &self.tree.script
    }

    fn witness_len(&self) -> Result<usize> {
        Ok(self.tree.script.len() + self.tree.control_block()?.size())
    }

    pub fn commit(&self) -> Result<CommitInfo> {
        let fees = commit_fee(&self.tree.script, self.fee_rate);
        let reveal_vsize = virtual_size_for(AddressFormat::Taproot, 1, 1, &[self.witness_len()?]);
        let reveal_fee = estimate_fee(reveal_vsize, self.fee_rate);
        let required_value = self
            .postage
            .checked_add(fees.max(reveal_fee))
            .ok_or_else(|| Error::InvalidConfig(format!("fee rate {} overflows the commit value", self.fee_rate)))?;
        let address = self.tree.address(self.network);
        info!("commit address {address}: fund with at least {required_value} sats");
        Ok(CommitInfo {
            address: address.to_string(),
            fees,
            reveal_fee,
            required_value,
            script_hex: self.tree.script.to_hex_string(),
        })
    }

    /// Build the reveal PSBT spending `commit_outpoint` through the envelope leaf.
    pub fn build_reveal_psbt(&self, commit_outpoint: OutPoint, commit_value: u64) -> Result<BuiltPsbt> {
        check_amount("commit value", commit_value)?;
        let mut strategy = RevealStrategy {
            inscriber: self,
            commit_outpoint,
            commit_value,
        };
        prepare(&mut strategy, self.fee_rate)
    }
}

struct RevealStrategy<'a> {
    inscriber: &'a Inscriber,
    commit_outpoint: OutPoint,
    commit_value: u64,
}

impl BuildStrategy for RevealStrategy<'_> {
    fn select_outputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        draft.push_output(self.inscriber.destination.clone(), self.inscriber.postage);
        Ok(())
    }

    fn select_inputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        let tree = &self.inscriber.tree;
        let control = tree.control_block()?;

        let mut input = bitcoin::psbt::Input {
            witness_utxo: Some(TxOut {
                value: Amount::from_sat(self.commit_value),
                script_pubkey: tree.address(self.inscriber.network).script_pubkey(),
            }),
            tap_internal_key: Some(self.inscriber.internal_key),
            tap_merkle_root: tree.spend_info.merkle_root(),
            ..Default::default()
        };
        input
            .tap_scripts
            .insert(control, (tree.script.clone(), LeafVersion::TapScript));

        draft.witness_lens.push(self.inscriber.witness_len()?);
        draft.inputs.push(BoundInput {
            txin: TxIn {
                previous_output: self.commit_outpoint,
                script_sig: ScriptBuf::new(),
                sequence: RBF_SEQUENCE,
                witness: Witness::default(),
            },
            psbt_input: input,
            value: self.commit_value,
            format: AddressFormat::Taproot,
        });
        Ok(())
    }

    fn change_script(&self, _draft: &TxDraft) -> Result<Option<ScriptBuf>> {
        Ok(Some(self.inscriber.change.clone()))
    }
}
