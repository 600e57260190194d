//! Dummy-UTXO creation: split cardinal value into small spacer outputs for instant trades.

use bitcoin::{Network, ScriptBuf};
use log::debug;
use serde::Deserialize;

use crate::bitcoin_utils::keys::{derive_address, parse_pubkey, AddressResolver};
use crate::bitcoin_utils::psbt::{InputBinder, SighashPolicy};
use crate::builder::transfer::{default_fee_rate, default_network};
use crate::builder::{prepare, BuildStrategy, BuiltPsbt, TxDraft};
use crate::error::{Error, Result};
use crate::indexer::ChainIndexer;
use crate::types::{AddressFormat, SafeMode, Utxo, DEFAULT_DUMMY_VALUE, DUMMY_INPUTS, DUMMY_MAX_SATS, DUMMY_MIN_SATS, MAX_DUMMY_COUNT};
use crate::wallet::{fetch_wallet, FetchOptions};

fn default_value() -> u64 {
    DEFAULT_DUMMY_VALUE
}

fn default_count() -> usize {
    DUMMY_INPUTS
}

fn default_format() -> AddressFormat {
    AddressFormat::Taproot
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DummyUtxoConfig {
    pub pubkey: String,
    #[serde(default = "default_network")]
    pub network: Network,
    /// Format of the address that funds and receives the dummies
    #[serde(default = "default_format")]
    pub format: AddressFormat,
    #[serde(default = "default_value")]
    pub value: u64,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
}

impl DummyUtxoConfig {
    pub fn new(pubkey: impl Into<String>, network: Network) -> Self {
        Self {
            pubkey: pubkey.into(),
            network,
            format: default_format(),
            value: default_value(),
            count: default_count(),
            fee_rate: default_fee_rate(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fee_rate == 0 {
            return Err(Error::InvalidConfig("fee rate must be positive".into()));
        }
        if self.count == 0 || self.count > MAX_DUMMY_COUNT {
            return Err(Error::InvalidConfig(format!(
                "dummy count must be within 1..={MAX_DUMMY_COUNT}, got {}",
                self.count
            )));
        }
        if !(DUMMY_MIN_SATS..=DUMMY_MAX_SATS).contains(&self.value) {
            return Err(Error::InvalidConfig(format!(
                "dummy value must be within {DUMMY_MIN_SATS}..={DUMMY_MAX_SATS} sats, got {}",
                self.value
            )));
        }
        Ok(())
    }
}

/// Greedy strategy: add spendables in wallet order until `value * count + fee` is covered.
pub struct DummyStrategy<'a, I: ChainIndexer> {
    config: &'a DummyUtxoConfig,
    spendables: &'a [Utxo],
    binder: InputBinder<'a, I>,
    owner: ScriptBuf,
}

impl<'a, I: ChainIndexer> DummyStrategy<'a, I> {
    pub fn new(config: &'a DummyUtxoConfig, spendables: &'a [Utxo], indexer: &'a I, owner: ScriptBuf) -> Self {
        Self {
            config,
            spendables,
            binder: InputBinder::new(indexer, config.network),
            owner,
        }
    }

    fn target(&self) -> Result<u64> {
        self.config
            .value
            .checked_mul(self.config.count as u64)
            .ok_or_else(|| Error::InvalidConfig("dummy total overflows".into()))
    }
}

impl<I: ChainIndexer> BuildStrategy for DummyStrategy<'_, I> {
    fn select_outputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        for _ in 0..self.config.count {
            draft.push_output(self.owner.clone(), self.config.value);
        }
        Ok(())
    }

    fn select_inputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        let target = self.target()?;
        for utxo in self.spendables {
            if draft.accept(self.binder.bind_utxo(utxo, SighashPolicy::Default)?) {
                let fee = draft.fee_for(draft.outputs.len())?;
                if draft.total_input_sats()? >= target.saturating_add(fee) {
                    debug!("dummy funding covered by {} inputs", draft.inputs.len());
                    break;
                }
            }
        }
        Ok(())
    }

    fn change_script(&self, _draft: &TxDraft) -> Result<Option<ScriptBuf>> {
        Ok(Some(self.owner.clone()))
    }
}

/// Build a PSBT that creates `count` dummy UTXOs of `value` sats.
pub fn create_dummy_utxos<R, I>(resolver: &R, indexer: &I, config: &DummyUtxoConfig) -> Result<BuiltPsbt>
where
    R: AddressResolver + ?Sized,
    I: ChainIndexer,
{
    config.validate()?;
    let pubkey = parse_pubkey(&config.pubkey)?;
    let wallet = fetch_wallet(
        resolver,
        indexer,
        &pubkey,
        config.network,
        &[config.format],
        &FetchOptions {
            safe_mode: SafeMode::On,
            ..Default::default()
        },
    )?;
    if wallet.spendables.is_empty() {
        return Err(Error::NoUtxos(config.pubkey.clone()));
    }

    let owner = derive_address(&pubkey, config.network, config.format)?.address.script_pubkey();
    let mut strategy = DummyStrategy::new(config, &wallet.spendables, indexer, owner);
    prepare(&mut strategy, config.fee_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin_utils::keys::StandardResolver;
    use crate::error::FaultKind;
    use crate::testing::{address, public_key, TestChain};

    #[test]
    fn test_creates_two_dummies_with_change() {
        let mut chain = TestChain::new(Network::Regtest);
        chain.fund(&public_key(3), AddressFormat::Taproot, 1_000);
        chain.fund(&public_key(3), AddressFormat::Taproot, 50_000);
        chain.fund(&public_key(3), AddressFormat::Taproot, 70_000);

        let cfg = DummyUtxoConfig::new(public_key(3).to_string(), Network::Regtest);
        let built = create_dummy_utxos(&StandardResolver, &chain.indexer, &cfg).unwrap();

        // the first UTXO alone cannot cover 1200 + fee, the second can
        assert_eq!(built.psbt.inputs.len(), 2);
        let outs = &built.psbt.unsigned_tx.output;
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[0].value.to_sat(), 600);
        assert_eq!(outs[1].value.to_sat(), 600);
        let owner = address(3, AddressFormat::Taproot, Network::Regtest).script_pubkey();
        assert!(outs.iter().all(|o| o.script_pubkey == owner));
        assert_eq!(built.change, Some(outs[2].value.to_sat()));
    }

    #[test]
    fn test_validate_bounds() {
        let mut cfg = DummyUtxoConfig::new(public_key(3).to_string(), Network::Regtest);
        assert!(cfg.validate().is_ok());
        cfg.value = 579;
        assert!(cfg.validate().is_err());
        cfg.value = 1_001;
        assert!(cfg.validate().is_err());
        cfg.value = 600;
        cfg.count = 0;
        assert!(cfg.validate().is_err());
        cfg.count = MAX_DUMMY_COUNT;
        assert!(cfg.validate().is_ok());
        cfg.count = MAX_DUMMY_COUNT + 1;
        assert_eq!(cfg.validate().unwrap_err().kind(), FaultKind::Validation);
    }

    #[test]
    fn test_oversized_count_fails_before_building() {
        let mut chain = TestChain::new(Network::Regtest);
        chain.fund(&public_key(3), AddressFormat::Taproot, 50_000);
        let mut cfg = DummyUtxoConfig::new(public_key(3).to_string(), Network::Regtest);
        cfg.count = usize::MAX;
        let err = create_dummy_utxos(&StandardResolver, &chain.indexer, &cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_wallet_is_funds_fault() {
        let chain = TestChain::new(Network::Regtest);
        let cfg = DummyUtxoConfig::new(public_key(3).to_string(), Network::Regtest);
        let err = create_dummy_utxos(&StandardResolver, &chain.indexer, &cfg).unwrap_err();
        assert_eq!(err.kind(), FaultKind::Funds);
    }
}
