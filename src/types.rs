//! Shared data structures and types

use std::{fmt, str::FromStr};

use bitcoin::{Network, OutPoint, Sequence, Txid};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Constants ────────────────────────────────────────────────────────────────

/// Change below this value is folded into the fee instead of creating an output.
pub const DUST_THRESHOLD: u64 = 600;

/// Smallest price a seller may ask for an inscription.
pub const MIN_PRICE_SATS: u64 = 600;

/// Every bound input opts the transaction into replace-by-fee.
pub const RBF_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;

// Spacer UTXOs used by the buyer side of an instant trade
pub const DUMMY_MIN_SATS: u64 = 580;
pub const DUMMY_MAX_SATS: u64 = 1_000;
pub const DUMMY_INPUTS: usize = 2;
pub const DEFAULT_DUMMY_VALUE: u64 = 600;
pub const MAX_DUMMY_COUNT: usize = 100;

pub const DEFAULT_POSTAGE: u64 = 10_000;
pub const DEFAULT_FEE_RATE: u64 = 10;

/// Input/output index the seller's signed pair occupies in the buyer's transaction.
pub const SELLER_SLOT: usize = 2;

/// Largest single data push allowed in Bitcoin Script.
pub const MAX_PUSH_SIZE: usize = 520;

/// No amount a caller asks for may exceed the 21M BTC supply.
pub const MAX_MONEY_SATS: u64 = 21_000_000 * 100_000_000;

/// Reject a caller-supplied amount above [`MAX_MONEY_SATS`].
pub fn check_amount(what: &str, sats: u64) -> Result<u64> {
    if sats > MAX_MONEY_SATS {
        return Err(Error::InvalidConfig(format!(
            "{what} of {sats} sats exceeds the {MAX_MONEY_SATS} sat supply"
        )));
    }
    Ok(sats)
}

/// Sum sat amounts, failing instead of wrapping.
pub fn sum_sats(what: &str, values: impl IntoIterator<Item = u64>) -> Result<u64> {
    values.into_iter().try_fold(0u64, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| Error::InvalidConfig(format!("{what} overflows")))
    })
}

// ── Address formats ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressFormat {
    Legacy,
    NestedSegwit,
    Segwit,
    Taproot,
}

impl AddressFormat {
    pub const ALL: [AddressFormat; 4] = [
        AddressFormat::Legacy,
        AddressFormat::NestedSegwit,
        AddressFormat::Segwit,
        AddressFormat::Taproot,
    ];

    /// Map an indexer `scriptPubKey.type` string onto a format.
    pub fn from_script_type(script_type: &str) -> Result<Self> {
        match script_type {
            "witness_v1_taproot" => Ok(AddressFormat::Taproot),
            "witness_v0_keyhash" => Ok(AddressFormat::Segwit),
            "scripthash" => Ok(AddressFormat::NestedSegwit),
            "pubkeyhash" => Ok(AddressFormat::Legacy),
            other => Err(Error::UnknownAddressType(other.to_string())),
        }
    }

    pub fn script_type(self) -> &'static str {
        match self {
            AddressFormat::Taproot => "witness_v1_taproot",
            AddressFormat::Segwit => "witness_v0_keyhash",
            AddressFormat::NestedSegwit => "scripthash",
            AddressFormat::Legacy => "pubkeyhash",
        }
    }

    /// Lower wins when picking the format that sizes a transaction.
    pub fn fee_priority(self) -> u8 {
        match self {
            AddressFormat::Taproot => 0,
            AddressFormat::NestedSegwit => 1,
            AddressFormat::Segwit => 2,
            AddressFormat::Legacy => 3,
        }
    }

    pub fn is_segwit(self) -> bool {
        !matches!(self, AddressFormat::Legacy)
    }
}

impl fmt::Display for AddressFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressFormat::Legacy => "legacy",
            AddressFormat::NestedSegwit => "nested-segwit",
            AddressFormat::Segwit => "segwit",
            AddressFormat::Taproot => "taproot",
        };
        f.pad(name)
    }
}

impl FromStr for AddressFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "p2pkh" => Ok(AddressFormat::Legacy),
            "nested-segwit" | "p2sh" | "p2sh-p2wpkh" => Ok(AddressFormat::NestedSegwit),
            "segwit" | "p2wpkh" => Ok(AddressFormat::Segwit),
            "taproot" | "p2tr" => Ok(AddressFormat::Taproot),
            other => Err(Error::UnknownAddressType(other.to_string())),
        }
    }
}

/// Parse a `--format` style list; `all` expands to every format.
pub fn parse_formats(s: &str) -> Result<Vec<AddressFormat>> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(AddressFormat::ALL.to_vec());
    }
    s.split(',').map(|f| f.trim().parse()).collect()
}

// ── Safe mode ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeMode {
    #[default]
    On,
    Off,
}

impl FromStr for SafeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on" => Ok(SafeMode::On),
            "off" => Ok(SafeMode::Off),
            other => Err(Error::InvalidConfig(format!("safe mode must be on|off, got {other}"))),
        }
    }
}

pub fn parse_network(s: &str) -> Result<Network> {
    match s {
        "mainnet" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(Error::InvalidConfig(format!(
            "network must be mainnet|testnet|signet|regtest, got {other}"
        ))),
    }
}

/// Parse `txid:vout`.
pub fn parse_outpoint(s: &str) -> Result<OutPoint> {
    let (txid, vout) = s
        .split_once(':')
        .ok_or_else(|| Error::InvalidOutpoint(s.to_string()))?;
    let txid: Txid = txid.parse().map_err(|_| Error::InvalidOutpoint(s.to_string()))?;
    let vout: u32 = vout.parse().map_err(|_| Error::InvalidOutpoint(s.to_string()))?;
    Ok(OutPoint { txid, vout })
}

// ── UTXO types ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordinal {
    pub number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inscription {
    pub id: String,
    pub outpoint: OutPoint,
    #[serde(default, rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Decoded JSON metadata envelope, if the inscription carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// An unspent output as reported by the chain indexer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub txid: Txid,
    #[serde(rename = "n")]
    pub vout: u32,
    #[serde(rename = "sats")]
    pub value: u64,
    pub script_type: String,
    pub address: String,
    /// Hex public key of the owning address, stamped on by the wallet layer
    #[serde(default, rename = "pub", skip_serializing_if = "Option::is_none")]
    pub owner_pubkey: Option<String>,
    #[serde(default)]
    pub ordinals: Vec<Ordinal>,
    #[serde(default)]
    pub inscriptions: Vec<Inscription>,
    #[serde(default)]
    pub safe_to_spend: bool,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint { txid: self.txid, vout: self.vout }
    }

    pub fn carries_assets(&self) -> bool {
        !self.ordinals.is_empty() || !self.inscriptions.is_empty()
    }

    pub fn is_dummy_sized(&self) -> bool {
        (DUMMY_MIN_SATS..=DUMMY_MAX_SATS).contains(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_limits() {
        assert_eq!(check_amount("price", MAX_MONEY_SATS).unwrap(), MAX_MONEY_SATS);
        assert_eq!(check_amount("price", MAX_MONEY_SATS + 1).unwrap_err().kind(), crate::FaultKind::Validation);
        assert_eq!(sum_sats("outputs", [1, 2, 3]).unwrap(), 6);
        assert!(sum_sats("outputs", [u64::MAX / 2 + 1, u64::MAX / 2 + 1]).is_err());
    }

    #[test]
    fn test_format_priority_order() {
        let mut formats = AddressFormat::ALL.to_vec();
        formats.sort_by_key(|f| f.fee_priority());
        assert_eq!(
            formats,
            vec![
                AddressFormat::Taproot,
                AddressFormat::NestedSegwit,
                AddressFormat::Segwit,
                AddressFormat::Legacy
            ]
        );
    }

    #[test]
    fn test_script_type_mapping() {
        for f in AddressFormat::ALL {
            assert_eq!(AddressFormat::from_script_type(f.script_type()).unwrap(), f);
        }
        assert!(matches!(
            AddressFormat::from_script_type("multisig"),
            Err(Error::UnknownAddressType(_))
        ));
    }

    #[test]
    fn test_parse_formats_all() {
        assert_eq!(parse_formats("all").unwrap().len(), 4);
        assert_eq!(
            parse_formats("p2tr,segwit").unwrap(),
            vec![AddressFormat::Taproot, AddressFormat::Segwit]
        );
        assert!(parse_formats("p2tr,bogus").is_err());
    }

    #[test]
    fn test_parse_outpoint() {
        let txid = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
        let op = parse_outpoint(&format!("{txid}:3")).unwrap();
        assert_eq!(op.vout, 3);
        assert_eq!(op.txid.to_string(), txid);
        assert!(parse_outpoint(txid).is_err());
        assert!(parse_outpoint(&format!("{txid}:x")).is_err());
        assert!(parse_outpoint("zz:1").is_err());
    }

    #[test]
    fn test_utxo_json_shape() {
        let json = serde_json::json!({
            "txid": "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
            "n": 1,
            "sats": 700,
            "scriptType": "witness_v1_taproot",
            "address": "tb1p...",
            "safeToSpend": true
        });
        let utxo: Utxo = serde_json::from_value(json).unwrap();
        assert_eq!(utxo.vout, 1);
        assert!(utxo.is_dummy_sized());
        assert!(!utxo.carries_assets());
    }
}
