//! Collection publishing and mint authorization
//!
//! A collection is an inscription whose JSON metadata lists its publishers and
//! the inscriptions it may contain, each with a mint limit. A mint claims one
//! of those slots and carries a publisher's signature over
//! `"<collection outpoint> <iid> <nonce>"`.

use bitcoin::{
    secp256k1::Secp256k1,
    sign_message::{signed_msg_hash, MessageSignature},
    Network,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bitcoin_utils::keys::parse_address;
use crate::error::{Error, Result};
use crate::indexer::ChainIndexer;
use crate::types::parse_outpoint;

pub const PROTOCOL: &str = "vord";
pub const VERSION: u32 = 1;
pub const COLLECTION_TYPE: &str = "col";
pub const MINT_TYPE: &str = "insc";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// One mintable inscription slot of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub iid: String,
    pub lim: u64,
    /// Subresource integrity hash of the item's content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub p: String,
    pub v: u32,
    pub ty: String,
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub url: String,
    pub slug: String,
    #[serde(default)]
    pub creator: Creator,
    /// Publisher addresses, referenced by index from mint claims
    pub publ: Vec<String>,
    pub insc: Vec<CollectionItem>,
}

impl CollectionMeta {
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::InvalidCollection(e.to_string()))
    }

    pub fn item(&self, iid: &str) -> Option<&CollectionItem> {
        self.insc.iter().find(|i| i.iid == iid)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PublishParams {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    pub slug: String,
    #[serde(default)]
    pub creator: Creator,
    pub publishers: Vec<String>,
    pub inscriptions: Vec<CollectionItem>,
}

/// Build and check the metadata record that publishes a collection.
///
/// The record is embedded as the metadata envelope of the collection's own
/// inscription.
pub fn publish_collection(params: PublishParams) -> Result<CollectionMeta> {
    if params.inscriptions.is_empty() {
        return Err(Error::InvalidCollection("inscriptions are required".into()));
    }
    if let Some(bad) = params.inscriptions.iter().find(|i| i.iid.is_empty() || i.lim == 0) {
        return Err(Error::InvalidCollection(format!(
            "inscription {:?} needs an iid and a positive limit",
            bad.iid
        )));
    }
    if params.publishers.is_empty() {
        return Err(Error::InvalidCollection("at least one publisher is required".into()));
    }
    if params.slug.is_empty() || params.title.is_empty() {
        return Err(Error::InvalidCollection("title and slug are required".into()));
    }

    Ok(CollectionMeta {
        p: PROTOCOL.into(),
        v: VERSION,
        ty: COLLECTION_TYPE.into(),
        title: params.title,
        desc: params.description,
        url: params.url,
        slug: params.slug,
        creator: params.creator,
        publ: params.publishers,
        insc: params.inscriptions,
    })
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    /// `txid:vout` of the output holding the collection inscription
    pub collection_outpoint: String,
    pub inscription_iid: String,
    pub publisher_index: usize,
    pub nonce: u64,
    /// Base64 signed-message signature by the publisher
    pub signature: String,
    #[serde(default)]
    pub traits: Option<Value>,
}

impl MintRequest {
    pub fn message(&self) -> String {
        mint_message(&self.collection_outpoint, &self.inscription_iid, self.nonce)
    }
}

pub fn mint_message(collection_outpoint: &str, iid: &str, nonce: u64) -> String {
    format!("{collection_outpoint} {iid} {nonce}")
}

/// Metadata embedded in a minted inscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MintMeta {
    pub p: String,
    pub v: u32,
    pub ty: String,
    pub col: String,
    pub iid: String,
    pub publ: String,
    pub nonce: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<Value>,
    pub sig: String,
}

impl MintMeta {
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::InvalidCollection(e.to_string()))
    }
}

/// Check a mint claim against the on-chain collection it references.
pub fn authorize_mint<I>(indexer: &I, network: Network, request: &MintRequest) -> Result<MintMeta>
where
    I: ChainIndexer + ?Sized,
{
    let outpoint = parse_outpoint(&request.collection_outpoint)?;
    let tx = indexer.fetch_tx(&outpoint.txid, network, false)?;
    let meta = tx
        .outputs
        .get(outpoint.vout as usize)
        .and_then(|o| o.inscriptions.first())
        .and_then(|i| i.meta.clone())
        .ok_or_else(|| Error::InvalidCollection(format!("no collection inscription at {outpoint}")))?;
    let collection: CollectionMeta =
        serde_json::from_value(meta).map_err(|e| Error::InvalidCollection(e.to_string()))?;

    let item = collection.item(&request.inscription_iid).ok_or_else(|| {
        Error::MintRejected(format!("{} is not part of the collection", request.inscription_iid))
    })?;
    let publisher = collection.publ.get(request.publisher_index).ok_or_else(|| {
        Error::MintRejected(format!("publisher index {} does not exist", request.publisher_index))
    })?;
    if request.nonce >= item.lim {
        return Err(Error::MintRejected(format!(
            "nonce {} exceeds the limit of {} for {}",
            request.nonce, item.lim, item.iid
        )));
    }

    let message = request.message();
    let verified = verify_message(publisher, &message, &request.signature, network)
        .map_err(|e| Error::MintRejected(format!("publisher {} does not resolve: {e}", request.publisher_index)))?;
    if !verified {
        return Err(Error::MintRejected(format!("signature does not verify for {publisher}")));
    }
    info!("mint authorized: {} nonce {} by {}", item.iid, request.nonce, publisher);

    Ok(MintMeta {
        p: PROTOCOL.into(),
        v: VERSION,
        ty: MINT_TYPE.into(),
        col: request.collection_outpoint.clone(),
        iid: request.inscription_iid.clone(),
        publ: publisher.clone(),
        nonce: request.nonce,
        traits: request.traits.clone(),
        sig: request.signature.clone(),
    })
}

/// Verify a Bitcoin signed-message signature against `address`.
///
/// Malformed signatures verify as `false`; an unparseable address is an error.
pub fn verify_message(address: &str, message: &str, signature: &str, network: Network) -> Result<bool> {
    let address = parse_address(address, network)?;
    let Ok(sig) = MessageSignature::from_base64(signature) else {
        debug!("signature is not a valid base64 message signature");
        return Ok(false);
    };
    let secp = Secp256k1::verification_only();
    let Ok(pubkey) = sig.recover_pubkey(&secp, signed_msg_hash(message)) else {
        return Ok(false);
    };
    Ok(address.is_related_to_pubkey(&pubkey))
}
