//! Deterministic fixtures shared by unit and integration tests
//!
//! Everything here is backed by real transactions: each funded UTXO is the
//! output of a transaction registered in a [`SnapshotIndexer`], so txids,
//! raw-transaction lookups and legacy input binding behave as on chain.

use bitcoin::{
    absolute::LockTime, hashes::Hash, sign_message::signed_msg_hash, transaction::Version, Address,
    Amount, Network, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use secp256k1::{Message, Secp256k1, SecretKey};
use serde_json::Value;

use crate::bitcoin_utils::keys::derive_address;
use crate::indexer::SnapshotIndexer;
use crate::types::{AddressFormat, Inscription, Utxo};

pub fn secret_key(seed: u8) -> SecretKey {
    SecretKey::from_slice(&[seed; 32]).expect("seed bytes form a valid key")
}

pub fn public_key(seed: u8) -> PublicKey {
    let secp = Secp256k1::new();
    PublicKey::new(secp256k1::PublicKey::from_secret_key(&secp, &secret_key(seed)))
}

pub fn address(seed: u8, format: AddressFormat, network: Network) -> Address {
    derive_address(&public_key(seed), network, format)
        .expect("compressed keys derive every format")
        .address
}

/// Bitcoin signed-message signature (base64) over `message`.
pub fn sign_message(seed: u8, message: &str) -> String {
    let secp = Secp256k1::new();
    let hash = signed_msg_hash(message);
    let msg = Message::from_digest(hash.to_byte_array());
    let sig = secp.sign_ecdsa_recoverable(&msg, &secret_key(seed));
    bitcoin::sign_message::MessageSignature::new(sig, true).to_base64()
}

/// A chain view that hands out funded UTXOs.
pub struct TestChain {
    pub indexer: SnapshotIndexer,
    nonce: u32,
}

impl TestChain {
    pub fn new(network: Network) -> Self {
        Self {
            indexer: SnapshotIndexer::new(network),
            nonce: 0,
        }
    }

    pub fn network(&self) -> Network {
        self.indexer.network
    }

    /// Register a fresh transaction paying `value` to `script_pubkey` at output 0.
    pub fn pay(&mut self, script_pubkey: ScriptBuf, value: u64) -> Txid {
        self.nonce += 1;
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint { txid: Txid::all_zeros(), vout: self.nonce },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut { value: Amount::from_sat(value), script_pubkey }],
        };
        self.indexer.add_transaction(&tx)
    }

    /// Fund the `format` address of `pubkey` with a plain (cardinal) UTXO.
    pub fn fund(&mut self, pubkey: &PublicKey, format: AddressFormat, value: u64) -> Utxo {
        let address = derive_address(pubkey, self.network(), format)
            .expect("compressed keys derive every format")
            .address;
        let txid = self.pay(address.script_pubkey(), value);
        let utxo = Utxo {
            txid,
            vout: 0,
            value,
            script_type: format.script_type().into(),
            address: address.to_string(),
            owner_pubkey: None,
            ordinals: vec![],
            inscriptions: vec![],
            safe_to_spend: true,
        };
        self.indexer.add_utxo(utxo.clone());
        utxo
    }

    /// Fund `pubkey` with a UTXO carrying one inscription.
    pub fn fund_inscription(
        &mut self,
        pubkey: &PublicKey,
        format: AddressFormat,
        value: u64,
        meta: Option<Value>,
    ) -> Utxo {
        let mut utxo = self.fund(pubkey, format, value);
        let inscription = Inscription {
            id: format!("{}i0", utxo.txid),
            outpoint: utxo.outpoint(),
            media_type: Some("text/plain;charset=utf-8".into()),
            meta,
        };
        self.indexer
            .place_inscription(utxo.txid, 0, inscription.clone())
            .expect("transaction was just registered");
        utxo.inscriptions.push(inscription);
        utxo.safe_to_spend = false;

        let stored = self
            .indexer
            .utxos
            .get_mut(&utxo.address)
            .and_then(|list| list.iter_mut().find(|u| u.outpoint() == utxo.outpoint()))
            .expect("utxo was just added");
        *stored = utxo.clone();
        utxo
    }
}
