//! Standard transfer: spend wallet UTXOs at the requested addresses to a list of outputs.

use bitcoin::{Network, ScriptBuf};
use log::warn;
use serde::Deserialize;

use crate::bitcoin_utils::keys::{parse_address, parse_pubkey, AddressResolver};
use crate::bitcoin_utils::psbt::{InputBinder, SighashPolicy};
use crate::builder::{prepare, BuildStrategy, BuiltPsbt, TxDraft};
use crate::error::{Error, Result};
use crate::indexer::ChainIndexer;
use crate::types::{check_amount, AddressFormat, SafeMode, DEFAULT_FEE_RATE};
use crate::wallet::{fetch_wallet, FetchOptions, WalletSnapshot};

/// Input address literal that matches the first spendable UTXO's address.
pub const ANY_INPUT: &str = "any";

#[derive(Clone, Debug, Deserialize)]
pub struct InputRequest {
    pub address: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputRequest {
    pub address: String,
    pub value: u64,
}

pub(crate) fn default_network() -> Network {
    Network::Bitcoin
}

pub(crate) fn default_fee_rate() -> u64 {
    DEFAULT_FEE_RATE
}

pub(crate) fn all_formats() -> Vec<AddressFormat> {
    AddressFormat::ALL.to_vec()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// Hex public key of the spending wallet
    pub pubkey: String,
    #[serde(default = "default_network")]
    pub network: Network,
    #[serde(default = "all_formats")]
    pub formats: Vec<AddressFormat>,
    pub inputs: Vec<InputRequest>,
    pub outputs: Vec<OutputRequest>,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
    #[serde(default)]
    pub safe_mode: SafeMode,
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fee_rate == 0 {
            return Err(Error::InvalidConfig("fee rate must be positive".into()));
        }
        if self.inputs.is_empty() {
            return Err(Error::InvalidConfig("at least one input address is required".into()));
        }
        if self.outputs.is_empty() {
            return Err(Error::InvalidConfig("at least one output is required".into()));
        }
        if self.formats.is_empty() {
            return Err(Error::InvalidConfig("at least one address format is required".into()));
        }
        for out in &self.outputs {
            check_amount("output value", out.value)?;
        }
        Ok(())
    }
}

pub struct TransferStrategy<'a, I: ChainIndexer> {
    config: &'a TransferConfig,
    wallet: &'a WalletSnapshot,
    binder: InputBinder<'a, I>,
    change: Option<ScriptBuf>,
}

impl<'a, I: ChainIndexer> TransferStrategy<'a, I> {
    pub fn new(config: &'a TransferConfig, wallet: &'a WalletSnapshot, indexer: &'a I) -> Self {
        Self {
            config,
            wallet,
            binder: InputBinder::new(indexer, config.network),
            change: None,
        }
    }

    fn resolve_input_address(&self, requested: &str) -> Option<String> {
        if requested == ANY_INPUT {
            self.wallet.spendables.first().map(|u| u.address.clone())
        } else {
            Some(requested.to_string())
        }
    }
}

impl<I: ChainIndexer> BuildStrategy for TransferStrategy<'_, I> {
    fn select_outputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        for out in &self.config.outputs {
            if out.value == 0 {
                warn!("skipping output to {}: value must be positive", out.address);
                continue;
            }
            match parse_address(&out.address, self.config.network) {
                Ok(address) => draft.push_output(address.script_pubkey(), out.value),
                Err(e) => warn!("skipping output: {e}"),
            }
        }
        if draft.outputs.is_empty() {
            return Err(Error::InvalidConfig("no valid outputs".into()));
        }
        Ok(())
    }

    fn select_inputs(&mut self, draft: &mut TxDraft) -> Result<()> {
        for request in &self.config.inputs {
            let Some(address) = self.resolve_input_address(&request.address) else {
                continue;
            };
            if self.change.is_none() {
                self.change = Some(parse_address(&address, self.config.network)?.script_pubkey());
            }
            let matching = self.wallet.spendables.iter().filter(|u| u.address == address);
            draft.bind_all(&self.binder, matching, SighashPolicy::Default)?;
        }
        Ok(())
    }

    fn change_script(&self, _draft: &TxDraft) -> Result<Option<ScriptBuf>> {
        Ok(self.change.clone())
    }

    fn fee_output_count(&self, _draft: &TxDraft) -> usize {
        self.config.outputs.len()
    }
}

/// Build an unsigned transfer PSBT from `config`.
pub fn create_transfer_psbt<R, I>(resolver: &R, indexer: &I, config: &TransferConfig) -> Result<BuiltPsbt>
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
        &config.formats,
        &FetchOptions {
            safe_mode: config.safe_mode,
            ..Default::default()
        },
    )?;
    if wallet.all_utxos().next().is_none() {
        return Err(Error::NoUtxos(config.pubkey.clone()));
    }

    let mut strategy = TransferStrategy::new(config, &wallet, indexer);
    prepare(&mut strategy, config.fee_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin_utils::keys::StandardResolver;
    use crate::error::FaultKind;
    use crate::testing::{address, public_key, TestChain};

    fn config(inputs: &[&str], outputs: Vec<OutputRequest>, fee_rate: u64) -> TransferConfig {
        TransferConfig {
            pubkey: public_key(1).to_string(),
            network: Network::Regtest,
            formats: AddressFormat::ALL.to_vec(),
            inputs: inputs.iter().map(|a| InputRequest { address: a.to_string() }).collect(),
            outputs,
            fee_rate,
            safe_mode: SafeMode::On,
        }
    }

    fn pay(value: u64) -> OutputRequest {
        OutputRequest {
            address: address(9, AddressFormat::Segwit, Network::Regtest).to_string(),
            value,
        }
    }

    #[test]
    fn test_any_resolves_to_first_spendable_address() {
        let mut chain = TestChain::new(Network::Regtest);
        chain.fund(&public_key(1), AddressFormat::Segwit, 4_000);
        chain.fund(&public_key(1), AddressFormat::Segwit, 3_000);
        chain.fund(&public_key(1), AddressFormat::Taproot, 50_000);

        let cfg = config(&[ANY_INPUT], vec![pay(1_000)], 2);
        let built = create_transfer_psbt(&StandardResolver, &chain.indexer, &cfg).unwrap();

        // formats are resolved in order, so the first spendable is a segwit UTXO
        assert_eq!(built.psbt.inputs.len(), 2);
        let change_spk = address(1, AddressFormat::Segwit, Network::Regtest).script_pubkey();
        assert_eq!(built.psbt.unsigned_tx.output.last().unwrap().script_pubkey, change_spk);
    }

    #[test]
    fn test_malformed_outputs_are_skipped() {
        let mut chain = TestChain::new(Network::Regtest);
        chain.fund(&public_key(1), AddressFormat::Taproot, 20_000);
        let tr = address(1, AddressFormat::Taproot, Network::Regtest).to_string();

        let outputs = vec![
            pay(0),
            OutputRequest { address: "garbage".into(), value: 1_000 },
            pay(2_000),
        ];
        let built = create_transfer_psbt(&StandardResolver, &chain.indexer, &config(&[&tr], outputs, 1)).unwrap();
        let values: Vec<u64> = built.psbt.unsigned_tx.output.iter().map(|o| o.value.to_sat()).collect();
        assert_eq!(values[0], 2_000);
    }

    #[test]
    fn test_never_spends_inscribed_utxos() {
        let mut chain = TestChain::new(Network::Regtest);
        let inscribed = chain.fund_inscription(&public_key(1), AddressFormat::Taproot, 100_000, None);
        chain.fund(&public_key(1), AddressFormat::Taproot, 30_000);
        let tr = address(1, AddressFormat::Taproot, Network::Regtest).to_string();

        let built = create_transfer_psbt(&StandardResolver, &chain.indexer, &config(&[&tr], vec![pay(5_000)], 3)).unwrap();
        assert!(built
            .psbt
            .unsigned_tx
            .input
            .iter()
            .all(|i| i.previous_output != inscribed.outpoint()));
    }

    #[test]
    fn test_shortfall_is_funds_fault() {
        let mut chain = TestChain::new(Network::Regtest);
        chain.fund(&public_key(1), AddressFormat::Taproot, 2_000);
        let tr = address(1, AddressFormat::Taproot, Network::Regtest).to_string();

        let err = create_transfer_psbt(&StandardResolver, &chain.indexer, &config(&[&tr], vec![pay(1_900)], 5))
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::Funds);
        assert!(matches!(err, Error::InsufficientFunds { available: 2_000, .. }));
    }

    #[test]
    fn test_amounts_beyond_supply_are_rejected() {
        let mut chain = TestChain::new(Network::Regtest);
        chain.fund(&public_key(1), AddressFormat::Taproot, 20_000);

        let huge = u64::MAX / 2 + 1;
        let cfg = config(&[ANY_INPUT], vec![pay(huge), pay(huge)], 1);
        let err = create_transfer_psbt(&StandardResolver, &chain.indexer, &cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        // in range per output, but the fee rate pushes the total past u64
        let cfg = config(&[ANY_INPUT], vec![pay(1_000)], u64::MAX);
        let err = create_transfer_psbt(&StandardResolver, &chain.indexer, &cfg).unwrap_err();
        assert_eq!(err.kind(), FaultKind::Validation);
    }

    #[test]
    fn test_validate_rejects_zero_fee_rate() {
        let cfg = config(&[ANY_INPUT], vec![pay(1_000)], 0);
        assert_eq!(cfg.validate().unwrap_err().kind(), FaultKind::Validation);
    }
}
