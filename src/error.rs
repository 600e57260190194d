use bitcoin::OutPoint;
use thiserror::Error;

/// Classes of failure a caller can react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Malformed caller input
    Validation,
    /// Not enough spendable value
    Funds,
    /// No input could be bound for the wallet's address types
    UnsupportedInput,
    /// Collection mint claim rejected
    Signature,
    /// Inscription script could not be compiled
    Envelope,
    /// The chain indexer failed or returned inconsistent data
    Indexer,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid outpoint: {0}")]
    InvalidOutpoint(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid price: {0} sats (minimum {min})", min = crate::types::MIN_PRICE_SATS)]
    InvalidPrice(u64),

    #[error("unknown address type: {0}")]
    UnknownAddressType(String),

    #[error("inscription not found at {0}")]
    InscriptionNotFound(OutPoint),

    #[error("multiple inscriptions in {0}; split them first")]
    MultipleInscriptions(OutPoint),

    #[error("invalid seller PSBT: {0}")]
    InvalidSellerPsbt(String),

    #[error("PSBT decode error: {0}")]
    PsbtDecode(String),

    #[error("PSBT construction error: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),

    #[error("invalid collection metadata: {0}")]
    InvalidCollection(String),

    #[error("no UTXOs found for {0}")]
    NoUtxos(String),

    #[error("no spendable inputs matched the requested addresses")]
    NoSpendableInputs,

    #[error(
        "insufficient funds: need {needed} sats, have {available} sats (deposit {} sats)",
        .needed - .available
    )]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("not enough dummy UTXOs: found {found}, need {needed}")]
    NoDummyUtxos { found: usize, needed: usize },

    #[error("none of the {0} candidate UTXOs could be bound as inputs")]
    NoUsableInputs(usize),

    #[error("mint rejected: {0}")]
    MintRejected(String),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("indexer error: {0}")]
    Indexer(String),
}

impl Error {
    pub fn kind(&self) -> FaultKind {
        match self {
            Error::InvalidOutpoint(_)
            | Error::InvalidAddress { .. }
            | Error::InvalidPublicKey(_)
            | Error::InvalidConfig(_)
            | Error::InvalidPrice(_)
            | Error::UnknownAddressType(_)
            | Error::InscriptionNotFound(_)
            | Error::MultipleInscriptions(_)
            | Error::InvalidSellerPsbt(_)
            | Error::PsbtDecode(_)
            | Error::Psbt(_)
            | Error::InvalidCollection(_) => FaultKind::Validation,
            Error::NoUtxos(_)
            | Error::NoSpendableInputs
            | Error::InsufficientFunds { .. }
            | Error::NoDummyUtxos { .. } => FaultKind::Funds,
            Error::NoUsableInputs(_) => FaultKind::UnsupportedInput,
            Error::MintRejected(_) => FaultKind::Signature,
            Error::Envelope(_) => FaultKind::Envelope,
            Error::Indexer(_) => FaultKind::Indexer,
        }
    }
}

/// Reasons an inscription envelope cannot be compiled.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("media type is missing")]
    MissingMediaType,

    #[error("media content is missing")]
    MissingContent,

    #[error("media content is not valid base64: {0}")]
    ContentEncoding(#[from] base64::DecodeError),

    #[error("metadata could not be serialized: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("metadata nesting exceeds {0} levels")]
    MetadataTooDeep(usize),

    #[error("data push of {0} bytes exceeds the script push limit")]
    PushTooLarge(usize),

    #[error("script of {0} bytes exceeds the standard weight limit")]
    ScriptTooLarge(usize),

    #[error("taproot tree could not be finalized")]
    Taproot,
}

pub type Result<T> = std::result::Result<T, Error>;
