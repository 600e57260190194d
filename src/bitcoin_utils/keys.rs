//! Key handling and address derivation

use bitcoin::{
    address::{Address, NetworkUnchecked},
    CompressedPublicKey, Network, PublicKey, Script, XOnlyPublicKey,
};
use secp256k1::Secp256k1;

use crate::error::{Error, Result};
use crate::types::AddressFormat;

/// One address derived from a wallet key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: Address,
    pub format: AddressFormat,
    pub pubkey: PublicKey,
    /// Internal key for taproot addresses
    pub x_only: Option<XOnlyPublicKey>,
}

/// Derives the addresses a wallet key controls.
pub trait AddressResolver {
    fn derive(
        &self,
        pubkey: &PublicKey,
        network: Network,
        formats: &[AddressFormat],
    ) -> Result<Vec<ResolvedAddress>>;

    fn derive_one(
        &self,
        pubkey: &PublicKey,
        network: Network,
        format: AddressFormat,
    ) -> Result<ResolvedAddress> {
        self.derive(pubkey, network, &[format])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnknownAddressType(format.to_string()))
    }
}

/// Single-key resolver: every format is derived directly from the given key.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardResolver;

impl AddressResolver for StandardResolver {
    fn derive(
        &self,
        pubkey: &PublicKey,
        network: Network,
        formats: &[AddressFormat],
    ) -> Result<Vec<ResolvedAddress>> {
        formats
            .iter()
            .map(|&format| derive_address(pubkey, network, format))
            .collect()
    }
}

/// Derive the address of `format` controlled by `pubkey`.
pub fn derive_address(pubkey: &PublicKey, network: Network, format: AddressFormat) -> Result<ResolvedAddress> {
    let (address, x_only) = match format {
        AddressFormat::Legacy => (Address::p2pkh(pubkey.pubkey_hash(), network), None),
        AddressFormat::NestedSegwit => (Address::p2shwpkh(&compressed(pubkey)?, network), None),
        AddressFormat::Segwit => (Address::p2wpkh(&compressed(pubkey)?, network), None),
        AddressFormat::Taproot => {
            let internal = to_x_only(pubkey);
            let secp = Secp256k1::verification_only();
            (Address::p2tr(&secp, internal, None, network), Some(internal))
        }
    };
    Ok(ResolvedAddress {
        address,
        format,
        pubkey: *pubkey,
        x_only,
    })
}

pub(crate) fn compressed(pubkey: &PublicKey) -> Result<CompressedPublicKey> {
    CompressedPublicKey::try_from(*pubkey)
        .map_err(|_| Error::InvalidPublicKey("segwit addresses need a compressed key".into()))
}

/// Drop the parity byte of a public key.
pub fn to_x_only(pubkey: &PublicKey) -> XOnlyPublicKey {
    XOnlyPublicKey::from(pubkey.inner)
}

pub fn parse_pubkey(hex_str: &str) -> Result<PublicKey> {
    hex_str
        .trim()
        .parse::<PublicKey>()
        .map_err(|e| Error::InvalidPublicKey(format!("{hex_str}: {e}")))
}

/// Parse an address and check it belongs to `network`.
pub fn parse_address(s: &str, network: Network) -> Result<Address> {
    s.parse::<Address<NetworkUnchecked>>()
        .map_err(|e| Error::InvalidAddress {
            address: s.to_string(),
            reason: e.to_string(),
        })?
        .require_network(network)
        .map_err(|e| Error::InvalidAddress {
            address: s.to_string(),
            reason: e.to_string(),
        })
}

/// Detect the address format a prevout script belongs to.
pub fn detect_script_format(spk: &Script) -> Result<AddressFormat> {
    if spk.is_p2tr() {
        return Ok(AddressFormat::Taproot);
    }
    if spk.is_p2wpkh() {
        return Ok(AddressFormat::Segwit);
    }
    if spk.is_p2sh() {
        return Ok(AddressFormat::NestedSegwit);
    }
    if spk.is_p2pkh() {
        return Ok(AddressFormat::Legacy);
    }
    Err(Error::UnknownAddressType(spk.to_hex_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::SecretKey;

    fn test_pubkey() -> PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[1u8; 32]).unwrap();
        PublicKey::new(secp256k1::PublicKey::from_secret_key(&secp, &sk))
    }

    #[test]
    fn test_derived_scripts_round_trip_through_detection() {
        let pk = test_pubkey();
        for addr in StandardResolver.derive(&pk, Network::Testnet, &AddressFormat::ALL).unwrap() {
            let detected = detect_script_format(&addr.address.script_pubkey()).unwrap();
            assert_eq!(detected, addr.format);
        }
    }

    #[test]
    fn test_taproot_carries_internal_key() {
        let pk = test_pubkey();
        let addr = derive_address(&pk, Network::Testnet, AddressFormat::Taproot).unwrap();
        assert_eq!(addr.x_only, Some(to_x_only(&pk)));
        assert!(addr.address.to_string().starts_with("tb1p"));
    }

    #[test]
    fn test_parse_address_checks_network() {
        let pk = test_pubkey();
        let addr = derive_address(&pk, Network::Bitcoin, AddressFormat::Segwit).unwrap();
        let s = addr.address.to_string();
        assert!(parse_address(&s, Network::Bitcoin).is_ok());
        assert!(parse_address(&s, Network::Testnet).is_err());
        assert!(parse_address("not-an-address", Network::Bitcoin).is_err());
    }

    #[test]
    fn test_uncompressed_key_rejected_for_segwit() {
        let mut pk = test_pubkey();
        pk.compressed = false;
        assert!(derive_address(&pk, Network::Testnet, AddressFormat::Segwit).is_err());
        assert!(derive_address(&pk, Network::Testnet, AddressFormat::Legacy).is_ok());
    }
}
