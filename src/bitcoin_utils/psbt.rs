//! PSBT input binding and encoding
//!
//! Binding turns an indexer UTXO into the `TxIn` + `psbt::Input` pair a signer
//! needs for the UTXO's address format:
//! - taproot: witness UTXO + tap internal key
//! - segwit: witness UTXO (P2WPKH)
//! - nested segwit: witness UTXO + P2WPKH redeem script
//! - legacy: full previous transaction as non-witness UTXO

use bitcoin::{
    psbt::{self, Psbt, PsbtSighashType},
    sighash::{EcdsaSighashType, TapSighashType},
    Amount, Network, ScriptBuf, TxIn, TxOut, Witness,
};
use log::{debug, warn};

use crate::bitcoin_utils::keys::{compressed, derive_address, parse_address, parse_pubkey};
use crate::error::{Error, Result};
use crate::indexer::ChainIndexer;
use crate::types::{AddressFormat, Utxo, RBF_SEQUENCE};

/// Signature-hash type recorded on a bound input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SighashPolicy {
    /// Leave the field unset; the signer uses its default
    #[default]
    Default,
    /// Commit only to this input and the output at the same index
    SinglePlusAnyoneCanPay,
}

impl SighashPolicy {
    fn for_format(self, format: AddressFormat) -> Option<PsbtSighashType> {
        match (self, format) {
            (SighashPolicy::Default, _) => None,
            (SighashPolicy::SinglePlusAnyoneCanPay, AddressFormat::Taproot) => {
                Some(TapSighashType::SinglePlusAnyoneCanPay.into())
            }
            (SighashPolicy::SinglePlusAnyoneCanPay, _) => {
                Some(EcdsaSighashType::SinglePlusAnyoneCanPay.into())
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoundInput {
    pub txin: TxIn,
    pub psbt_input: psbt::Input,
    pub value: u64,
    pub format: AddressFormat,
}

/// Outcome of binding one UTXO. `Unsupported` is recoverable: the caller
/// drops the UTXO and carries on with the rest.
#[derive(Clone, Debug)]
pub enum Binding {
    Bound(Box<BoundInput>),
    Unsupported(String),
}

pub struct InputBinder<'a, I: ChainIndexer> {
    indexer: &'a I,
    network: Network,
}

impl<'a, I: ChainIndexer> InputBinder<'a, I> {
    pub fn new(indexer: &'a I, network: Network) -> Self {
        Self { indexer, network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Bind `utxo`, using its indexer script type to pick the format.
    pub fn bind_utxo(&self, utxo: &Utxo, sighash: SighashPolicy) -> Result<Binding> {
        match AddressFormat::from_script_type(&utxo.script_type) {
            Ok(format) => self.bind(utxo, format, sighash),
            Err(e) => Ok(self.unsupported(utxo, e.to_string())),
        }
    }

    /// Bind `utxo` as an input of `format`.
    ///
    /// Only indexer failures are returned as errors. A UTXO whose owning key
    /// cannot be reconstructed comes back as [`Binding::Unsupported`].
    pub fn bind(&self, utxo: &Utxo, format: AddressFormat, sighash: SighashPolicy) -> Result<Binding> {
        let Some(pub_hex) = utxo.owner_pubkey.as_deref() else {
            return Ok(self.unsupported(utxo, "owner public key unknown".into()));
        };
        let pubkey = match parse_pubkey(pub_hex) {
            Ok(pk) => pk,
            Err(e) => return Ok(self.unsupported(utxo, e.to_string())),
        };
        let address = match parse_address(&utxo.address, self.network) {
            Ok(a) => a,
            Err(e) => return Ok(self.unsupported(utxo, e.to_string())),
        };
        let derived = match derive_address(&pubkey, self.network, format) {
            Ok(d) => d,
            Err(e) => return Ok(self.unsupported(utxo, e.to_string())),
        };
        let script_pubkey = address.script_pubkey();
        if derived.address.script_pubkey() != script_pubkey {
            return Ok(self.unsupported(
                utxo,
                format!("{format} address of the owner key does not match {}", utxo.address),
            ));
        }

        let witness_utxo = TxOut {
            value: Amount::from_sat(utxo.value),
            script_pubkey,
        };
        let mut input = psbt::Input::default();
        match format {
            AddressFormat::Taproot => {
                input.witness_utxo = Some(witness_utxo);
                input.tap_internal_key = derived.x_only;
            }
            AddressFormat::Segwit => {
                input.witness_utxo = Some(witness_utxo);
            }
            AddressFormat::NestedSegwit => {
                let wpkh = compressed(&pubkey)?.wpubkey_hash();
                input.witness_utxo = Some(witness_utxo);
                input.redeem_script = Some(ScriptBuf::new_p2wpkh(&wpkh));
            }
            AddressFormat::Legacy => {
                let chain_tx = self.indexer.fetch_tx(&utxo.txid, self.network, true)?;
                let mut prev = chain_tx
                    .raw
                    .ok_or_else(|| Error::Indexer(format!("no raw transaction returned for {}", utxo.txid)))?;
                if prev.compute_txid() != utxo.txid {
                    return Err(Error::Indexer(format!("raw transaction does not hash to {}", utxo.txid)));
                }
                if prev.output.get(utxo.vout as usize).is_none() {
                    return Err(Error::Indexer(format!("{} has no output {}", utxo.txid, utxo.vout)));
                }
                for txin in &mut prev.input {
                    txin.witness = Witness::default();
                }
                input.non_witness_utxo = Some(prev);
            }
        }
        input.sighash_type = sighash.for_format(format);

        debug!("bound {}:{} as {} ({} sats)", utxo.txid, utxo.vout, format, utxo.value);
        Ok(Binding::Bound(Box::new(BoundInput {
            txin: TxIn {
                previous_output: utxo.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence: RBF_SEQUENCE,
                witness: Witness::default(),
            },
            psbt_input: input,
            value: utxo.value,
            format,
        })))
    }

    fn unsupported(&self, utxo: &Utxo, reason: String) -> Binding {
        warn!("skipping {}:{}: {}", utxo.txid, utxo.vout, reason);
        Binding::Unsupported(format!("{}:{}: {}", utxo.txid, utxo.vout, reason))
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedPsbt {
    pub hex: String,
    pub base64: String,
}

pub fn encode_psbt(psbt: &Psbt) -> EncodedPsbt {
    EncodedPsbt {
        hex: psbt.serialize_hex(),
        base64: psbt.to_string(),
    }
}

/// Decode a PSBT given as hex or base64.
pub fn decode_psbt(s: &str) -> Result<Psbt> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        let bytes = hex::decode(s).map_err(|e| Error::PsbtDecode(e.to_string()))?;
        return Psbt::deserialize(&bytes).map_err(|e| Error::PsbtDecode(e.to_string()));
    }
    s.parse::<Psbt>().map_err(|e| Error::PsbtDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::SnapshotIndexer;
    use bitcoin::{absolute::LockTime, transaction::Version, Transaction, Txid};
    use secp256k1::{Secp256k1, SecretKey};

    fn test_pubkey() -> bitcoin::PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[2u8; 32]).unwrap();
        bitcoin::PublicKey::new(secp256k1::PublicKey::from_secret_key(&secp, &sk))
    }

    fn prev_tx(spk: ScriptBuf) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut { value: Amount::from_sat(5_000), script_pubkey: spk }],
        }
    }

    fn utxo_for(format: AddressFormat, txid: Txid) -> Utxo {
        let pk = test_pubkey();
        let addr = derive_address(&pk, Network::Regtest, format).unwrap();
        Utxo {
            txid,
            vout: 0,
            value: 5_000,
            script_type: format.script_type().into(),
            address: addr.address.to_string(),
            owner_pubkey: Some(pk.to_string()),
            ordinals: vec![],
            inscriptions: vec![],
            safe_to_spend: true,
        }
    }

    fn bound(b: Binding) -> BoundInput {
        match b {
            Binding::Bound(b) => *b,
            Binding::Unsupported(r) => panic!("unexpected unsupported: {r}"),
        }
    }

    #[test]
    fn test_bind_each_format() {
        let mut idx = SnapshotIndexer::new(Network::Regtest);
        let pk = test_pubkey();
        let legacy_spk = derive_address(&pk, Network::Regtest, AddressFormat::Legacy)
            .unwrap()
            .address
            .script_pubkey();
        let legacy_txid = idx.add_transaction(&prev_tx(legacy_spk));
        let binder = InputBinder::new(&idx, Network::Regtest);

        let tr = bound(binder.bind_utxo(&utxo_for(AddressFormat::Taproot, legacy_txid), SighashPolicy::Default).unwrap());
        assert!(tr.psbt_input.tap_internal_key.is_some());
        assert!(tr.psbt_input.witness_utxo.is_some());
        assert_eq!(tr.txin.sequence, RBF_SEQUENCE);

        let sw = bound(binder.bind_utxo(&utxo_for(AddressFormat::Segwit, legacy_txid), SighashPolicy::Default).unwrap());
        assert!(sw.psbt_input.witness_utxo.as_ref().unwrap().script_pubkey.is_p2wpkh());
        assert!(sw.psbt_input.redeem_script.is_none());

        let nested = bound(binder.bind_utxo(&utxo_for(AddressFormat::NestedSegwit, legacy_txid), SighashPolicy::Default).unwrap());
        assert!(nested.psbt_input.redeem_script.as_ref().unwrap().is_p2wpkh());

        let legacy = bound(binder.bind_utxo(&utxo_for(AddressFormat::Legacy, legacy_txid), SighashPolicy::Default).unwrap());
        assert!(legacy.psbt_input.witness_utxo.is_none());
        assert_eq!(legacy.psbt_input.non_witness_utxo.as_ref().unwrap().compute_txid(), legacy_txid);
    }

    #[test]
    fn test_single_anyonecanpay_sighash() {
        let idx = SnapshotIndexer::new(Network::Regtest);
        let binder = InputBinder::new(&idx, Network::Regtest);
        let txid = prev_tx(ScriptBuf::new()).compute_txid();
        let tr = bound(
            binder
                .bind_utxo(&utxo_for(AddressFormat::Taproot, txid), SighashPolicy::SinglePlusAnyoneCanPay)
                .unwrap(),
        );
        assert_eq!(tr.psbt_input.sighash_type.unwrap().to_u32(), 0x83);
        let sw = bound(
            binder
                .bind_utxo(&utxo_for(AddressFormat::Segwit, txid), SighashPolicy::SinglePlusAnyoneCanPay)
                .unwrap(),
        );
        assert_eq!(sw.psbt_input.sighash_type.unwrap().to_u32(), 0x83);
    }

    #[test]
    fn test_unrecoverable_owner_is_unsupported() {
        let idx = SnapshotIndexer::new(Network::Regtest);
        let binder = InputBinder::new(&idx, Network::Regtest);
        let txid = prev_tx(ScriptBuf::new()).compute_txid();

        let mut no_key = utxo_for(AddressFormat::Taproot, txid);
        no_key.owner_pubkey = None;
        assert!(matches!(binder.bind_utxo(&no_key, SighashPolicy::Default).unwrap(), Binding::Unsupported(_)));

        let mut wrong_type = utxo_for(AddressFormat::Taproot, txid);
        wrong_type.script_type = "nonstandard".into();
        assert!(matches!(binder.bind_utxo(&wrong_type, SighashPolicy::Default).unwrap(), Binding::Unsupported(_)));

        // segwit key claimed for a taproot address
        let tr = utxo_for(AddressFormat::Taproot, txid);
        assert!(matches!(
            binder.bind(&tr, AddressFormat::Segwit, SighashPolicy::Default).unwrap(),
            Binding::Unsupported(_)
        ));
    }

    #[test]
    fn test_legacy_without_prev_tx_is_indexer_error() {
        let idx = SnapshotIndexer::new(Network::Regtest);
        let binder = InputBinder::new(&idx, Network::Regtest);
        let txid = prev_tx(ScriptBuf::new()).compute_txid();
        let err = binder
            .bind_utxo(&utxo_for(AddressFormat::Legacy, txid), SighashPolicy::Default)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FaultKind::Indexer);
    }

    #[test]
    fn test_decode_hex_and_base64() {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: bitcoin::OutPoint { txid: prev_tx(ScriptBuf::new()).compute_txid(), vout: 0 },
                script_sig: ScriptBuf::new(),
                sequence: RBF_SEQUENCE,
                witness: Witness::default(),
            }],
            output: vec![TxOut { value: Amount::from_sat(1), script_pubkey: ScriptBuf::new() }],
        };
        let psbt = Psbt::from_unsigned_tx(tx).unwrap();
        let enc = encode_psbt(&psbt);
        assert_eq!(decode_psbt(&enc.hex).unwrap(), psbt);
        assert_eq!(decode_psbt(&enc.base64).unwrap(), psbt);
        assert!(decode_psbt("not a psbt").is_err());
    }
}
