//! Error types shared by the taproot primitives.

use thiserror::Error;

/// Coarse classification of every failure in this workspace.
///
/// Callers that only need to decide between "fix your data", "wrong key"
/// and "not implemented" can match on this instead of the full enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong byte length, bad varint, bad identifier or subtype.
    MalformedInput,
    /// Invalid point, failed point arithmetic, bad signature.
    CryptoFailure,
    /// Recomputed data disagrees with recorded data.
    StateInconsistency,
    /// Deliberately unimplemented path.
    UnsupportedOperation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaprootError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key aggregation failed: {0}")]
    AggregationError(String),

    #[error("Invalid public key: {0}")]
    InvalidPubkey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivkey(String),

    #[error("Invalid taptree: {0}")]
    InvalidTaptree(String),

    #[error("Invalid control block: {0}")]
    InvalidControlBlock(String),

    #[error("Invalid witness: {0}")]
    InvalidWitness(String),

    #[error("Invalid tapscript: {0}")]
    InvalidTapscript(String),

    #[error("Invalid P2TR output script: {0}")]
    InvalidOutputScript(String),
}

impl TaprootError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaprootError::AggregationError(_)
            | TaprootError::InvalidPubkey(_)
            | TaprootError::InvalidPrivkey(_) => ErrorKind::CryptoFailure,
            _ => ErrorKind::MalformedInput,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaprootError>;
