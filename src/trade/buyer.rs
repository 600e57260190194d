//! Buyer side of an instant trade.

use bitcoin::{Network, ScriptBuf};
use log::debug;
use serde::Deserialize;

use crate::bitcoin_utils::keys::{derive_address, parse_address, parse_pubkey, AddressResolver};
use crate::bitcoin_utils::psbt::{decode_psbt, InputBinder, SighashPolicy};
use crate::builder::transfer::{default_fee_rate, default_network};
use crate::builder::{prepare, BuildStrategy, BuiltPsbt, TxDraft};
use crate::error::{Error, Result};
use crate::indexer::ChainIndexer;
use crate::trade::{merge_seller_psbt, SellerPair};
use crate::types::{sum_sats, AddressFormat, SafeMode, Utxo, DUMMY_INPUTS};
use crate::wallet::{fetch_wallet, FetchOptions};

fn default_format() -> AddressFormat {
    AddressFormat::Taproot
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerConfig {
    pub pubkey: String,
    #[serde(default = "default_network")]
    pub network: Network,
    /// Format of the funding address; it also receives dummies and change
    #[serde(default = "default_format")]
    pub format: AddressFormat,
    /// Seller PSBT, hex or base64
    pub seller_psbt: String,
    /// Where the inscription goes; defaults to the buyer's own address
    #[serde(default)]
    pub receive_address: Option<String>,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
    #[serde(default)]
    pub safe_mode: SafeMode,
}

impl BuyerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fee_rate == 0 {
            return Err(Error::InvalidConfig("fee rate must be positive".into()));
        }
        if self.seller_psbt.trim().is_empty() {
            return Err(Error::InvalidConfig("seller PSBT is required".into()));
        }
        Ok(())
    }
}

pub struct BuyerStrategy<'a, I: ChainIndexer> {
    binder: InputBinder<'a, I>,
    dummies: Vec<&'a Utxo>,
    funding: Vec<&'a Utxo>,
    seller: Option<SellerPair>,
    postage: u64,
    owner: ScriptBuf,
    receive: ScriptBuf,
}

impl<'a, I: ChainIndexer> BuyerStrategy<'a, I> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        indexer: &'a I,
        network: Network,
        dummies: Vec<&'a Utxo>,
        funding: Vec<&'a Utxo>,
        seller: SellerPair,
        postage: u64,
        owner: ScriptBuf,
        receive: ScriptBuf,
    ) -> Self {
        Self {
            binder: InputBinder::new(indexer, network),
            dummies,
            funding,
            seller: Some(seller),
            postage,
            owner,
            receive,
        }
    }
}

impl<I: ChainIndexer> BuildStrategy for BuyerStrategy<'_, I> {
    fn select_outputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        let merged = sum_sats("dummy total", self.dummies.iter().map(|u| u.value))?;
        draft.push_output(self.owner.clone(), merged);
        draft.push_output(self.receive.clone(), self.postage);
        Ok(())
    }

    fn select_inputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        let bound = draft.bind_all(&self.binder, self.dummies.iter().copied(), SighashPolicy::Default)?;
        if bound < DUMMY_INPUTS {
            return Err(Error::NoDummyUtxos {
                found: bound,
                needed: DUMMY_INPUTS,
            });
        }

        let seller = self
            .seller
            .take()
            .ok_or_else(|| Error::InvalidSellerPsbt("seller pair already merged".into()))?;
        merge_seller_psbt(draft, seller)?;

        let added = draft.bind_all(&self.binder, self.funding.iter().copied(), SighashPolicy::Default)?;
        debug!("buyer funding: {added} inputs beyond the dummies");
        Ok(())
    }

    fn change_script(&self, _draft: &TxDraft) -> Result<Option<ScriptBuf>> {
        Ok(Some(self.owner.clone()))
    }
}

/// Complete a seller PSBT into a buyer PSBT that can be signed and broadcast.
pub fn create_buyer_psbt<R, I>(resolver: &R, indexer: &I, config: &BuyerConfig) -> Result<BuiltPsbt>
where
    R: AddressResolver + ?Sized,
    I: ChainIndexer,
{
    config.validate()?;
    let pubkey = parse_pubkey(&config.pubkey)?;
    let seller_psbt = decode_psbt(&config.seller_psbt)?;
    let seller = SellerPair::from_psbt(&seller_psbt)?;

    let inscription_outpoint = seller.input.txin.previous_output;
    let chain_tx = indexer.fetch_tx(&inscription_outpoint.txid, config.network, false)?;
    let postage = chain_tx
        .outputs
        .get(inscription_outpoint.vout as usize)
        .map(|o| o.value)
        .ok_or_else(|| Error::InvalidSellerPsbt(format!("{inscription_outpoint} does not exist")))?;
    if postage != seller.input.value {
        return Err(Error::InvalidSellerPsbt(format!(
            "seller input claims {} sats, chain has {postage}",
            seller.input.value
        )));
    }

    let wallet = fetch_wallet(
        resolver,
        indexer,
        &pubkey,
        config.network,
        &[config.format],
        &FetchOptions {
            safe_mode: config.safe_mode,
            reserved: [inscription_outpoint].into_iter().collect(),
        },
    )?;

    let dummies: Vec<&Utxo> = wallet
        .spendables
        .iter()
        .filter(|u| u.is_dummy_sized() && !u.carries_assets())
        .take(DUMMY_INPUTS)
        .collect();
    if dummies.len() < DUMMY_INPUTS {
        return Err(Error::NoDummyUtxos {
            found: dummies.len(),
            needed: DUMMY_INPUTS,
        });
    }
    let funding: Vec<&Utxo> = wallet
        .spendables
        .iter()
        .filter(|u| !dummies.iter().any(|d| d.outpoint() == u.outpoint()))
        .collect();

    let owner = derive_address(&pubkey, config.network, config.format)?.address.script_pubkey();
    let receive = match &config.receive_address {
        Some(address) => parse_address(address, config.network)?.script_pubkey(),
        None => owner.clone(),
    };

    let mut strategy = BuyerStrategy::new(
        indexer,
        config.network,
        dummies,
        funding,
        seller,
        postage,
        owner,
        receive,
    );
    prepare(&mut strategy, config.fee_rate)
}
