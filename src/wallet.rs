//! Wallet aggregation and UTXO classification
//!
//! A [`WalletSnapshot`] is rebuilt from the indexer on every call and never
//! cached. Classification is a fold over the UTXO list, so the counters are
//! independent of the order addresses or UTXOs come back in.

use std::collections::BTreeSet;

use bitcoin::{Network, OutPoint, PublicKey};
use log::{debug, warn};
use serde::Serialize;

use crate::bitcoin_utils::keys::AddressResolver;
use crate::error::Result;
use crate::indexer::ChainIndexer;
use crate::types::{AddressFormat, Inscription, Ordinal, SafeMode, Utxo};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub satoshis: u64,
    /// Value held in UTXOs without ordinals or inscriptions that the indexer marks safe
    pub cardinals: u64,
    pub spendable_count: usize,
    pub unspendable_count: usize,
    pub ordinals_count: usize,
    pub inscriptions_count: usize,
}

impl Counters {
    fn record(mut self, utxo: &Utxo, spendable: bool) -> Self {
        self.satoshis += utxo.value;
        if utxo.safe_to_spend && !utxo.carries_assets() {
            self.cardinals += utxo.value;
        }
        if spendable {
            self.spendable_count += 1;
        } else {
            self.unspendable_count += 1;
        }
        self.ordinals_count += utxo.ordinals.len();
        self.inscriptions_count += utxo.inscriptions.len();
        self
    }

    fn merge(self, other: Counters) -> Self {
        Counters {
            satoshis: self.satoshis + other.satoshis,
            cardinals: self.cardinals + other.cardinals,
            spendable_count: self.spendable_count + other.spendable_count,
            unspendable_count: self.unspendable_count + other.unspendable_count,
            ordinals_count: self.ordinals_count + other.ordinals_count,
            inscriptions_count: self.inscriptions_count + other.inscriptions_count,
        }
    }
}

/// Result of partitioning one UTXO list.
#[derive(Clone, Debug, Default)]
pub struct Classified {
    pub spendables: Vec<Utxo>,
    pub unspendables: Vec<Utxo>,
    pub counters: Counters,
}

/// Partition `utxos` into spendable and unspendable sets.
///
/// With safe mode on, anything carrying ordinals or inscriptions (or flagged
/// unsafe by the indexer) is unspendable. With it off everything is
/// spendable. `reserved` outpoints, such as the asset being traded, are
/// unspendable in either mode.
pub fn classify(utxos: Vec<Utxo>, safe_mode: SafeMode, reserved: &BTreeSet<OutPoint>) -> Classified {
    utxos.into_iter().fold(Classified::default(), |mut acc, utxo| {
        let spendable = !reserved.contains(&utxo.outpoint())
            && match safe_mode {
                SafeMode::On => utxo.safe_to_spend && !utxo.carries_assets(),
                SafeMode::Off => true,
            };
        acc.counters = acc.counters.record(&utxo, spendable);
        if spendable {
            acc.spendables.push(utxo);
        } else {
            acc.unspendables.push(utxo);
        }
        acc
    })
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBalance {
    pub address: String,
    pub format: AddressFormat,
    pub pubkey: String,
    pub counters: Counters,
    /// Set when the address has no UTXOs at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutpointOrdinal {
    pub outpoint: OutPoint,
    #[serde(flatten)]
    pub ordinal: Ordinal,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub addresses: Vec<AddressBalance>,
    pub counters: Counters,
    pub spendables: Vec<Utxo>,
    pub unspendables: Vec<Utxo>,
    pub ordinals: Vec<OutpointOrdinal>,
    pub inscriptions: Vec<Inscription>,
}

impl WalletSnapshot {
    pub fn balance_of(&self, address: &str) -> Option<&AddressBalance> {
        self.addresses.iter().find(|a| a.address == address)
    }

    pub fn address_of(&self, format: AddressFormat) -> Option<&AddressBalance> {
        self.addresses.iter().find(|a| a.format == format)
    }

    pub fn all_utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.spendables.iter().chain(self.unspendables.iter())
    }
}

#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    pub safe_mode: SafeMode,
    pub reserved: BTreeSet<OutPoint>,
}

/// Resolve every requested format for `pubkey`, query each address and fold the
/// results into one snapshot.
pub fn fetch_wallet<R, I>(
    resolver: &R,
    indexer: &I,
    pubkey: &PublicKey,
    network: Network,
    formats: &[AddressFormat],
    options: &FetchOptions,
) -> Result<WalletSnapshot>
where
    R: AddressResolver + ?Sized,
    I: ChainIndexer + ?Sized,
{
    let resolved = resolver.derive(pubkey, network, formats)?;
    let mut snapshot = WalletSnapshot::default();

    for addr in resolved {
        let address = addr.address.to_string();
        let pub_hex = addr.pubkey.to_string();
        let set = indexer.fetch_unspent_utxos(&address, network)?;
        debug!(
            "{} ({}): {} utxos, {} flagged spendable by indexer",
            address,
            addr.format,
            set.total_utxos,
            set.spendable_utxos.len()
        );

        let utxos: Vec<Utxo> = set
            .spendable_utxos
            .into_iter()
            .chain(set.unspendable_utxos)
            .map(|mut u| {
                u.owner_pubkey = Some(pub_hex.clone());
                u
            })
            .collect();

        let notice = if utxos.is_empty() {
            warn!("no UTXOs found for {address}");
            Some(format!("No UTXOs found for {address}"))
        } else {
            None
        };

        let classified = classify(utxos, options.safe_mode, &options.reserved);
        for utxo in classified.spendables.iter().chain(&classified.unspendables) {
            let outpoint = utxo.outpoint();
            snapshot.ordinals.extend(utxo.ordinals.iter().map(|o| OutpointOrdinal {
                outpoint,
                ordinal: o.clone(),
            }));
            snapshot.inscriptions.extend(utxo.inscriptions.iter().cloned());
        }

        snapshot.counters = snapshot.counters.merge(classified.counters);
        snapshot.addresses.push(AddressBalance {
            address,
            format: addr.format,
            pubkey: pub_hex,
            counters: classified.counters,
            notice,
        });
        snapshot.spendables.extend(classified.spendables);
        snapshot.unspendables.extend(classified.unspendables);
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{hashes::Hash, Txid};

    fn utxo(vout: u32, value: u64, inscribed: bool) -> Utxo {
        Utxo {
            txid: Txid::all_zeros(),
            vout,
            value,
            script_type: "witness_v1_taproot".into(),
            address: "addr".into(),
            owner_pubkey: None,
            ordinals: vec![],
            inscriptions: if inscribed {
                vec![Inscription {
                    id: format!("{}i0", Txid::all_zeros()),
                    outpoint: OutPoint { txid: Txid::all_zeros(), vout },
                    media_type: Some("text/plain".into()),
                    meta: None,
                }]
            } else {
                vec![]
            },
            safe_to_spend: !inscribed,
        }
    }

    #[test]
    fn test_safe_mode_partitions_exactly() {
        let utxos: Vec<Utxo> = (0..10).map(|i| utxo(i, 1_000 + i as u64, i % 3 == 0)).collect();
        let c = classify(utxos.clone(), SafeMode::On, &BTreeSet::new());

        assert_eq!(c.spendables.len() + c.unspendables.len(), utxos.len());
        for u in &utxos {
            let in_spend = c.spendables.contains(u);
            let in_unspend = c.unspendables.contains(u);
            assert!(in_spend ^ in_unspend);
            if !u.inscriptions.is_empty() {
                assert!(in_unspend);
            }
        }
        assert_eq!(c.counters.inscriptions_count, 4);
        assert_eq!(c.counters.spendable_count, 6);
        assert_eq!(c.counters.satoshis, utxos.iter().map(|u| u.value).sum::<u64>());
        assert_eq!(c.counters.cardinals, c.spendables.iter().map(|u| u.value).sum::<u64>());
    }

    #[test]
    fn test_safe_mode_off_keeps_reserved_asset() {
        let utxos = vec![utxo(0, 10_000, true), utxo(1, 5_000, true), utxo(2, 700, false)];
        let reserved: BTreeSet<_> = [utxos[0].outpoint()].into_iter().collect();
        let c = classify(utxos, SafeMode::Off, &reserved);
        assert_eq!(c.spendables.len(), 2);
        assert_eq!(c.unspendables.len(), 1);
        assert_eq!(c.unspendables[0].vout, 0);
    }

    #[test]
    fn test_counters_are_order_independent() {
        let mut utxos: Vec<Utxo> = (0..6).map(|i| utxo(i, 600 * (i as u64 + 1), i % 2 == 0)).collect();
        let a = classify(utxos.clone(), SafeMode::On, &BTreeSet::new()).counters;
        utxos.reverse();
        let b = classify(utxos, SafeMode::On, &BTreeSet::new()).counters;
        assert_eq!(a, b);
    }
}
