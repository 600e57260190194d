//! Ordinal-aware PSBT construction
//!
//! Builds unsigned PSBTs for wallets and marketplaces that hold inscriptions:
//! wallet classification, fee sizing per address format, inscription
//! envelopes, standard transfers, dummy-UTXO creation and instant-trade swaps.

pub mod bitcoin_utils;
pub mod builder;
pub mod collection;
pub mod commands;
pub mod error;
pub mod indexer;
pub mod inscription;
pub mod trade;
pub mod types;
pub mod wallet;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, FaultKind, Result};
