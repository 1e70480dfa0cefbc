//! Errors for PSBT signing, finalization and MuSig2 record handling.

use bitcoin::key::XOnlyPublicKey;
use tapsig_core::{ErrorKind, TaprootError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PsbtError {
    #[error(transparent)]
    Taproot(#[from] TaprootError),

    #[error("PSBT encoding error: {0}")]
    Encoding(String),

    #[error("Input index {index} out of range ({count} inputs)")]
    InputIndexOutOfRange { index: usize, count: usize },

    #[error("Input {index}: {field} is required")]
    MissingField { index: usize, field: &'static str },

    #[error("Input {0} is already finalized")]
    InputFinalized(usize),

    // ─── Proprietary records ───
    #[error("Invalid proprietary key: {0}")]
    InvalidProprietaryKey(String),

    #[error("Invalid proprietary value: {0}")]
    InvalidProprietaryValue(String),

    #[error("Duplicate participant pub keys found")]
    DuplicateParticipant,

    // ─── MuSig2 integrity checks ───
    #[error("Input {index}: found {count} matching participant key values instead of 1")]
    ParticipantRecordCount { index: usize, count: usize },

    #[error("Participants record tapInternalKey does not match the aggregated participant keys")]
    InternalKeyMismatch,

    #[error("Participants record tapOutputKey does not match the tweaked internal key")]
    OutputKeyMismatch,

    #[error("Input tapInternalKey does not match the aggregated participant keys")]
    InputInternalKeyMismatch,

    #[error("Input {index}: {count} tap key origins match the root wallet key, expected exactly 1")]
    AmbiguousDerivation { index: usize, count: usize },

    #[error("Input {0}: no tap key origin matches the signing key fingerprint")]
    NoMatchingDerivation(usize),

    #[error("Derived pubkey does not match key origin {0}")]
    DerivationMismatch(String),

    #[error("Derived pubkey {0} is not one of the participant keys")]
    SignerNotParticipant(String),

    #[error("Private key is required to generate nonces")]
    NeuteredKey,

    #[error("Invalid session id size {0}, expected 32")]
    InvalidSessionId(usize),

    #[error("Nonce generation failed: {0}")]
    Nonce(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    // ─── Signing ───
    #[error("Taproot key path signing is not supported")]
    KeyPathSigningUnsupported,

    #[error("Input {index}: only one leaf script supported, found {count}")]
    LeafScriptCount { index: usize, count: usize },

    #[error("Tap script leaf version 0x{script:02x} does not match control block 0x{control_block:02x}")]
    LeafVersionMismatch { script: u8, control_block: u8 },

    #[error("Signer cannot sign for leaf hash {0}")]
    LeafNotPermitted(String),

    #[error("Sighash type 0x{0:02x} is not allowed")]
    SighashNotAllowed(u32),

    #[error("Input {0} is not a taproot input")]
    NotTaproot(usize),

    #[error("Input {index}: need a UTXO to compute the sighash")]
    MissingUtxo { index: usize },

    #[error("Input {index}: non-witness UTXO txid does not match the prevout")]
    NonWitnessUtxoMismatch { index: usize },

    #[error("Sighash computation failed: {0}")]
    Sighash(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Input {index}: could not find a signature for {pubkey}")]
    MissingSignature {
        index: usize,
        pubkey: XOnlyPublicKey,
    },

    #[error("Input {index}: expected {expected} signatures, found {found}")]
    SignatureCount {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Cannot modify {0} - signatures exist")]
    SignaturesExist(String),

    #[error("No inputs were signed")]
    NoInputsSigned,

    // ─── Finalization / validation ───
    #[error("Finalization failed: {0}")]
    Finalize(String),

    #[error("There must be {expected} global xpubs and there are {found}")]
    GlobalXpubCount { expected: usize, found: usize },

    #[error("Must have witness UTXO for all inputs")]
    MissingWitnessUtxo,

    #[error("Not all required previous transactions provided")]
    MissingPreviousTransaction,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PsbtError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PsbtError::Taproot(e) => e.kind(),

            PsbtError::Nonce(_)
            | PsbtError::Derivation(_)
            | PsbtError::Sighash(_)
            | PsbtError::InvalidSignature(_) => ErrorKind::CryptoFailure,

            PsbtError::DuplicateParticipant
            | PsbtError::ParticipantRecordCount { .. }
            | PsbtError::InternalKeyMismatch
            | PsbtError::OutputKeyMismatch
            | PsbtError::InputInternalKeyMismatch
            | PsbtError::AmbiguousDerivation { .. }
            | PsbtError::NoMatchingDerivation(_)
            | PsbtError::DerivationMismatch(_)
            | PsbtError::SignerNotParticipant(_)
            | PsbtError::NeuteredKey
            | PsbtError::InputFinalized(_)
            | PsbtError::LeafVersionMismatch { .. }
            | PsbtError::LeafNotPermitted(_)
            | PsbtError::SighashNotAllowed(_)
            | PsbtError::NotTaproot(_)
            | PsbtError::NonWitnessUtxoMismatch { .. }
            | PsbtError::MissingSignature { .. }
            | PsbtError::SignatureCount { .. }
            | PsbtError::SignaturesExist(_)
            | PsbtError::NoInputsSigned
            | PsbtError::GlobalXpubCount { .. } => ErrorKind::StateInconsistency,

            PsbtError::KeyPathSigningUnsupported | PsbtError::LeafScriptCount { .. } => {
                ErrorKind::UnsupportedOperation
            }

            PsbtError::Encoding(_)
            | PsbtError::InputIndexOutOfRange { .. }
            | PsbtError::MissingField { .. }
            | PsbtError::InvalidProprietaryKey(_)
            | PsbtError::InvalidProprietaryValue(_)
            | PsbtError::InvalidSessionId(_)
            | PsbtError::MissingUtxo { .. }
            | PsbtError::Finalize(_)
            | PsbtError::MissingWitnessUtxo
            | PsbtError::MissingPreviousTransaction
            | PsbtError::Config(_) => ErrorKind::MalformedInput,
        }
    }
}

pub type Result<T> = std::result::Result<T, PsbtError>;
