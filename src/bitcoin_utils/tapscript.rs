//! Inscription envelope compilation
//!
//! An envelope is a tapscript leaf of the form
//!
//! ```text
//! <internal key> OP_CHECKSIG
//! OP_FALSE OP_IF "ord" 0x01 <media type> OP_0 <chunk>... OP_ENDIF
//! [OP_FALSE OP_IF "ord" 0x01 "application/json;charset=utf-8" OP_0 <json chunk>... OP_ENDIF]
//! ```
//!
//! The leaf is committed to as the only leaf of a taproot tree keyed by the
//! same internal key; the resulting output is the inscription's commit address.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use bitcoin::{
    address::Address,
    blockdata::opcodes::all::{OP_CHECKSIG, OP_ENDIF, OP_IF, OP_PUSHBYTES_0},
    policy::MAX_STANDARD_TX_WEIGHT,
    script::{Builder, PushBytes},
    taproot::{ControlBlock, LeafVersion, TaprootBuilder, TaprootSpendInfo},
    Network, ScriptBuf, XOnlyPublicKey,
};
use secp256k1::Secp256k1;
use serde_json::Value;

use crate::error::EnvelopeError;
use crate::types::MAX_PUSH_SIZE;

pub const PROTOCOL_ID: [u8; 3] = *b"ord";
pub const CONTENT_TYPE_TAG: [u8; 1] = [1];
pub const META_MEDIA_TYPE: &str = "application/json;charset=utf-8";

// Reveal transaction allowance used when pricing a commit address
const REVEAL_BASE_VBYTES: u64 = 80;
const REVEAL_INPUT_VBYTES: u64 = 180;

const MAX_META_DEPTH: usize = 5;

/// What one inscription carries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InscriptionContent {
    pub media_type: String,
    /// UTF-8 text for `text/*` media types, base64 for everything else
    pub media_content: String,
    pub meta: Option<Value>,
}

impl InscriptionContent {
    pub fn new(media_type: impl Into<String>, media_content: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            media_content: media_content.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    fn is_text(&self) -> bool {
        self.media_type.contains("text")
    }

    /// Raw content bytes as they land on chain.
    pub fn content_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        if self.is_text() {
            Ok(self.media_content.as_bytes().to_vec())
        } else {
            Ok(B64.decode(self.media_content.trim())?)
        }
    }
}

/// Compile the inscription leaf script.
///
/// With `recover` set only `<key> OP_CHECKSIG` is emitted, which spends a
/// commit output back to its owner without revealing content.
pub fn build_witness_script(
    internal_key: &XOnlyPublicKey,
    content: &InscriptionContent,
    recover: bool,
) -> Result<ScriptBuf, EnvelopeError> {
    if recover {
        return Ok(build_recovery_script(internal_key));
    }
    if content.media_type.is_empty() {
        return Err(EnvelopeError::MissingMediaType);
    }
    if content.media_content.is_empty() {
        return Err(EnvelopeError::MissingContent);
    }

    let body = content.content_bytes()?;
    let mut builder = Builder::new()
        .push_x_only_key(internal_key)
        .push_opcode(OP_CHECKSIG);
    builder = push_envelope(builder, content.media_type.as_bytes(), &body)?;

    if let Some(meta) = &content.meta {
        let json = serde_json::to_vec(meta)?;
        builder = push_envelope(builder, META_MEDIA_TYPE.as_bytes(), &json)?;
    }

    let script = builder.into_script();
    if script.len() > MAX_STANDARD_TX_WEIGHT as usize {
        return Err(EnvelopeError::ScriptTooLarge(script.len()));
    }
    Ok(script)
}

pub fn build_recovery_script(internal_key: &XOnlyPublicKey) -> ScriptBuf {
    Builder::new()
        .push_x_only_key(internal_key)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

fn push_envelope(builder: Builder, media_type: &[u8], body: &[u8]) -> Result<Builder, EnvelopeError> {
    let mut builder = builder
        .push_opcode(OP_PUSHBYTES_0) // OP_FALSE
        .push_opcode(OP_IF)
        .push_slice(PROTOCOL_ID)
        .push_slice(CONTENT_TYPE_TAG)
        .push_slice(as_push(media_type)?)
        .push_opcode(OP_PUSHBYTES_0);
    for chunk in body.chunks(MAX_PUSH_SIZE) {
        builder = builder.push_slice(as_push(chunk)?);
    }
    Ok(builder.push_opcode(OP_ENDIF))
}

fn as_push(data: &[u8]) -> Result<&PushBytes, EnvelopeError> {
    if data.len() > MAX_PUSH_SIZE {
        return Err(EnvelopeError::PushTooLarge(data.len()));
    }
    <&PushBytes>::try_from(data).map_err(|_| EnvelopeError::PushTooLarge(data.len()))
}

/// Single-leaf taproot commitment to an inscription script.
pub struct CommitTree {
    pub script: ScriptBuf,
    pub internal_key: XOnlyPublicKey,
    pub spend_info: TaprootSpendInfo,
}

impl CommitTree {
    pub fn new(internal_key: XOnlyPublicKey, script: ScriptBuf) -> Result<Self, EnvelopeError> {
        let secp = Secp256k1::verification_only();
        let spend_info = TaprootBuilder::new()
            .add_leaf(0, script.clone())
            .map_err(|_| EnvelopeError::Taproot)?
            .finalize(&secp, internal_key)
            .map_err(|_| EnvelopeError::Taproot)?;
        Ok(Self {
            script,
            internal_key,
            spend_info,
        })
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2tr_tweaked(self.spend_info.output_key(), network)
    }

    pub fn control_block(&self) -> Result<ControlBlock, EnvelopeError> {
        self.spend_info
            .control_block(&(self.script.clone(), LeafVersion::TapScript))
            .ok_or(EnvelopeError::Taproot)
    }
}

/// Fee the commit output must carry so the reveal transaction can pay for itself.
pub fn commit_fee(script: &ScriptBuf, sats_per_vbyte: u64) -> u64 {
    let base = (REVEAL_BASE_VBYTES + REVEAL_INPUT_VBYTES).saturating_mul(sats_per_vbyte);
    let hex_len = 2 * script.len() as u64;
    base.saturating_add(hex_len.saturating_mul(sats_per_vbyte).div_ceil(10))
}

/// URI-component encode every string in `meta`, nesting at most five levels.
pub fn encode_metadata(meta: &Value) -> Result<Value, EnvelopeError> {
    encode_value(meta, 0)
}

fn encode_value(value: &Value, depth: usize) -> Result<Value, EnvelopeError> {
    if depth > MAX_META_DEPTH {
        return Err(EnvelopeError::MetadataTooDeep(MAX_META_DEPTH));
    }
    Ok(match value {
        Value::String(s) => Value::String(encode_uri_component(s)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), encode_value(v, depth + 1)?)))
                .collect::<Result<_, EnvelopeError>>()?,
        ),
        other => other.clone(),
    })
}

fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
