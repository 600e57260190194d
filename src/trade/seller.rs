//! Seller side of an instant trade.

use bitcoin::{Network, OutPoint, ScriptBuf};
use serde::Deserialize;

use crate::bitcoin_utils::keys::{derive_address, parse_address, parse_pubkey, AddressResolver};
use crate::bitcoin_utils::psbt::{InputBinder, SighashPolicy};
use crate::builder::transfer::default_network;
use crate::builder::{prepare, BuildStrategy, BuiltPsbt, TxDraft};
use crate::error::{Error, Result};
use crate::indexer::ChainIndexer;
use crate::types::{check_amount, parse_outpoint, AddressFormat, Utxo, MIN_PRICE_SATS};
use crate::wallet::{fetch_wallet, FetchOptions, WalletSnapshot};

fn default_format() -> AddressFormat {
    AddressFormat::Taproot
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerConfig {
    pub pubkey: String,
    #[serde(default = "default_network")]
    pub network: Network,
    /// Format of the address holding the inscription
    #[serde(default = "default_format")]
    pub format: AddressFormat,
    /// `txid:vout` of the output carrying the inscription
    pub inscription_outpoint: String,
    /// Asking price in sats, paid on top of the inscription's postage
    pub price: u64,
    /// Where the payment goes; defaults to the seller's own address
    #[serde(default)]
    pub receive_address: Option<String>,
}

impl SellerConfig {
    pub fn validate(&self) -> Result<OutPoint> {
        if self.price < MIN_PRICE_SATS {
            return Err(Error::InvalidPrice(self.price));
        }
        check_amount("price", self.price)?;
        parse_outpoint(&self.inscription_outpoint)
    }
}

/// Locate the UTXO carrying the inscription at `outpoint`.
pub fn find_inscription_utxo(wallet: &WalletSnapshot, outpoint: OutPoint) -> Result<&Utxo> {
    let utxo = wallet
        .all_utxos()
        .find(|u| u.outpoint() == outpoint || u.inscriptions.iter().any(|i| i.outpoint == outpoint))
        .filter(|u| !u.inscriptions.is_empty())
        .ok_or(Error::InscriptionNotFound(outpoint))?;
    if utxo.inscriptions.len() > 1 {
        return Err(Error::MultipleInscriptions(outpoint));
    }
    Ok(utxo)
}

pub struct SellerStrategy<'a, I: ChainIndexer> {
    binder: InputBinder<'a, I>,
    utxo: &'a Utxo,
    format: AddressFormat,
    receive: ScriptBuf,
    price: u64,
}

impl<'a, I: ChainIndexer> SellerStrategy<'a, I> {
    pub fn new(
        indexer: &'a I,
        network: Network,
        utxo: &'a Utxo,
        format: AddressFormat,
        receive: ScriptBuf,
        price: u64,
    ) -> Self {
        Self {
            binder: InputBinder::new(indexer, network),
            utxo,
            format,
            receive,
            price,
        }
    }
}

impl<I: ChainIndexer> BuildStrategy for SellerStrategy<'_, I> {
    fn select_outputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        let ask = self
            .price
            .checked_add(self.utxo.value)
            .ok_or_else(|| Error::InvalidConfig(format!("price {} plus postage overflows", self.price)))?;
        draft.push_output(self.receive.clone(), check_amount("price plus postage", ask)?);
        Ok(())
    }

    fn select_inputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        let binding = self
            .binder
            .bind(self.utxo, self.format, SighashPolicy::SinglePlusAnyoneCanPay)?;
        draft.accept(binding);
        Ok(())
    }

    fn change_script(&self, _draft: &TxDraft) -> Result<Option<ScriptBuf>> {
        Ok(None)
    }

    // The buyer funds the payment output and the network fee.
    fn funded_by_inputs(&self) -> bool {
        false
    }
}

/// Build the seller's one-input, one-output PSBT for an inscription listing.
pub fn create_seller_psbt<R, I>(resolver: &R, indexer: &I, config: &SellerConfig) -> Result<BuiltPsbt>
where
    R: AddressResolver + ?Sized,
    I: ChainIndexer,
{
    let outpoint = config.validate()?;
    let pubkey = parse_pubkey(&config.pubkey)?;
    let wallet = fetch_wallet(
        resolver,
        indexer,
        &pubkey,
        config.network,
        &[config.format],
        &FetchOptions::default(),
    )?;
    let utxo = find_inscription_utxo(&wallet, outpoint)?;

    let receive = match &config.receive_address {
        Some(address) => parse_address(address, config.network)?.script_pubkey(),
        None => derive_address(&pubkey, config.network, config.format)?.address.script_pubkey(),
    };

    let mut strategy = SellerStrategy::new(indexer, config.network, utxo, config.format, receive, config.price);
    prepare(&mut strategy, 0)
}
