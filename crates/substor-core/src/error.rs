//! Error types for Substor Core.

use thiserror::Error;

/// Errors produced by the pure encoding, derivation and signing primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("address derivation error: {0}")]
    AddressDerivation(String),

    #[error("address {address} is not under prefix {prefix}")]
    PrefixMismatch { prefix: String, address: String },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("unsupported extrinsic: {0}")]
    UnsupportedExtrinsic(String),

    #[error("pallet {0} is not in the runtime schema")]
    UnknownPallet(String),

    #[error("call {pallet}.{call} is not in the runtime schema")]
    UnknownCall { pallet: String, call: String },

    #[error("storage item {pallet}.{item} is not in the runtime schema")]
    UnknownStorage { pallet: String, item: String },
}

impl From<parity_scale_codec::Error> for CoreError {
    fn from(e: parity_scale_codec::Error) -> Self {
        CoreError::Decoding(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
