//! Chain indexer seam
//!
//! Construction never talks to the network itself. Everything it knows about
//! the chain comes through [`ChainIndexer`]: per-address UTXO sets annotated
//! with ordinal/inscription membership, and previous transactions. Retry and
//! backoff policy belongs to the implementation.
//!
//! [`SnapshotIndexer`] is a JSON-backed implementation that serves a frozen
//! view of one network; the CLI loads it with `--snapshot`.

use std::collections::BTreeMap;

use bitcoin::{consensus::encode::deserialize, Network, Transaction, Txid};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Inscription, Utxo};

/// UTXOs of one address, pre-split by the indexer's own safety flag.
#[derive(Clone, Debug, Default)]
pub struct UnspentSet {
    pub total_utxos: usize,
    pub spendable_utxos: Vec<Utxo>,
    pub unspendable_utxos: Vec<Utxo>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainTxOut {
    pub value: u64,
    pub inscriptions: Vec<Inscription>,
}

#[derive(Clone, Debug)]
pub struct ChainTx {
    pub txid: Txid,
    pub outputs: Vec<ChainTxOut>,
    /// Present only when requested with `include_raw`
    pub raw: Option<Transaction>,
}

pub trait ChainIndexer {
    fn fetch_unspent_utxos(&self, address: &str, network: Network) -> Result<UnspentSet>;

    fn fetch_tx(&self, txid: &Txid, network: Network, include_raw: bool) -> Result<ChainTx>;
}

impl<T: ChainIndexer + ?Sized> ChainIndexer for &T {
    fn fetch_unspent_utxos(&self, address: &str, network: Network) -> Result<UnspentSet> {
        (**self).fetch_unspent_utxos(address, network)
    }

    fn fetch_tx(&self, txid: &Txid, network: Network, include_raw: bool) -> Result<ChainTx> {
        (**self).fetch_tx(txid, network, include_raw)
    }
}

// ── Snapshot implementation ──────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxRecord {
    /// Consensus-encoded transaction
    pub hex: String,
    /// Inscriptions currently located in each output, keyed by vout
    #[serde(default)]
    pub inscriptions: BTreeMap<u32, Vec<Inscription>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotIndexer {
    pub network: Network,
    #[serde(default)]
    pub utxos: BTreeMap<String, Vec<Utxo>>,
    #[serde(default)]
    pub transactions: BTreeMap<Txid, TxRecord>,
}

impl SnapshotIndexer {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            utxos: BTreeMap::new(),
            transactions: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Indexer(format!("bad snapshot: {e}")))
    }

    pub fn add_utxo(&mut self, utxo: Utxo) {
        self.utxos.entry(utxo.address.clone()).or_default().push(utxo);
    }

    pub fn add_transaction(&mut self, tx: &Transaction) -> Txid {
        let txid = tx.compute_txid();
        self.transactions.insert(
            txid,
            TxRecord {
                hex: bitcoin::consensus::encode::serialize_hex(tx),
                inscriptions: BTreeMap::new(),
            },
        );
        txid
    }

    /// Record that `inscription` now sits in output `vout` of `txid`.
    pub fn place_inscription(&mut self, txid: Txid, vout: u32, inscription: Inscription) -> Result<()> {
        let record = self
            .transactions
            .get_mut(&txid)
            .ok_or_else(|| Error::Indexer(format!("transaction {txid} not in snapshot")))?;
        record.inscriptions.entry(vout).or_default().push(inscription);
        Ok(())
    }

    fn check_network(&self, network: Network) -> Result<()> {
        if network != self.network {
            return Err(Error::Indexer(format!(
                "snapshot is for {}, query was for {}",
                self.network, network
            )));
        }
        Ok(())
    }
}

impl ChainIndexer for SnapshotIndexer {
    fn fetch_unspent_utxos(&self, address: &str, network: Network) -> Result<UnspentSet> {
        self.check_network(network)?;
        let utxos = self.utxos.get(address).cloned().unwrap_or_default();
        let total_utxos = utxos.len();
        let (spendable_utxos, unspendable_utxos) = utxos
            .into_iter()
            .partition(|u| u.safe_to_spend && !u.carries_assets());
        Ok(UnspentSet {
            total_utxos,
            spendable_utxos,
            unspendable_utxos,
        })
    }

    fn fetch_tx(&self, txid: &Txid, network: Network, include_raw: bool) -> Result<ChainTx> {
        self.check_network(network)?;
        let record = self
            .transactions
            .get(txid)
            .ok_or_else(|| Error::Indexer(format!("failed to get raw transaction for id: {txid}")))?;
        let bytes = hex::decode(&record.hex).map_err(|e| Error::Indexer(e.to_string()))?;
        let tx: Transaction = deserialize(&bytes).map_err(|e| Error::Indexer(e.to_string()))?;
        if tx.compute_txid() != *txid {
            return Err(Error::Indexer(format!("snapshot entry for {txid} hashes to a different txid")));
        }

        let outputs = tx
            .output
            .iter()
            .enumerate()
            .map(|(vout, out)| ChainTxOut {
                value: out.value.to_sat(),
                inscriptions: record
                    .inscriptions
                    .get(&(vout as u32))
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();

        Ok(ChainTx {
            txid: *txid,
            outputs,
            raw: include_raw.then_some(tx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{absolute::LockTime, transaction::Version, Amount, ScriptBuf, TxOut};

    fn sample_tx() -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![
                TxOut { value: Amount::from_sat(1_000), script_pubkey: ScriptBuf::new() },
                TxOut { value: Amount::from_sat(2_000), script_pubkey: ScriptBuf::new() },
            ],
        }
    }

    fn utxo(address: &str, vout: u32, safe: bool) -> Utxo {
        Utxo {
            txid: sample_tx().compute_txid(),
            vout,
            value: 1_000,
            script_type: "witness_v1_taproot".into(),
            address: address.into(),
            owner_pubkey: None,
            ordinals: vec![],
            inscriptions: vec![],
            safe_to_spend: safe,
        }
    }

    #[test]
    fn test_unspent_partition() {
        let mut idx = SnapshotIndexer::new(Network::Regtest);
        idx.add_utxo(utxo("a", 0, true));
        idx.add_utxo(utxo("a", 1, false));
        let set = idx.fetch_unspent_utxos("a", Network::Regtest).unwrap();
        assert_eq!(set.total_utxos, 2);
        assert_eq!(set.spendable_utxos.len(), 1);
        assert_eq!(set.unspendable_utxos.len(), 1);

        let empty = idx.fetch_unspent_utxos("b", Network::Regtest).unwrap();
        assert_eq!(empty.total_utxos, 0);
    }

    #[test]
    fn test_network_mismatch_is_rejected() {
        let idx = SnapshotIndexer::new(Network::Regtest);
        assert!(idx.fetch_unspent_utxos("a", Network::Bitcoin).is_err());
    }

    #[test]
    fn test_fetch_tx_values_and_raw() {
        let mut idx = SnapshotIndexer::new(Network::Regtest);
        let txid = idx.add_transaction(&sample_tx());
        let tx = idx.fetch_tx(&txid, Network::Regtest, false).unwrap();
        assert_eq!(tx.outputs.iter().map(|o| o.value).collect::<Vec<_>>(), vec![1_000, 2_000]);
        assert!(tx.raw.is_none());
        assert!(idx.fetch_tx(&txid, Network::Regtest, true).unwrap().raw.is_some());
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut idx = SnapshotIndexer::new(Network::Testnet);
        idx.add_transaction(&sample_tx());
        idx.add_utxo(utxo("a", 0, true));
        let json = serde_json::to_string(&idx).unwrap();
        let back = SnapshotIndexer::from_json(&json).unwrap();
        assert_eq!(back.network, Network::Testnet);
        assert_eq!(back.utxos["a"].len(), 1);
        assert_eq!(back.transactions.len(), 1);
    }
}
