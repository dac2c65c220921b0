//! Error types for ledger node access.

use thiserror::Error;

use substor_core::BlockHash;

/// Why the transaction pool refused a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum InvalidTransaction {
    /// The nonce was already consumed by an included transaction.
    #[error("stale nonce")]
    Stale,

    /// The nonce is too far ahead to be held by the pool.
    #[error("future nonce")]
    Future,

    /// A pending transaction already uses this nonce.
    #[error("priority too low (nonce already pending)")]
    PriorityTooLow,

    /// The signature does not verify, or was made for another chain or runtime.
    #[error("bad signature")]
    BadProof,

    /// The signer cannot pay the transaction fee.
    #[error("inability to pay fees")]
    Payment,

    /// The transaction or its call could not be decoded.
    #[error("malformed transaction")]
    Malformed,
}

/// Errors that can occur talking to a ledger node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The transaction pool rejected a submission.
    #[error("transaction rejected: {0}")]
    Rejected(InvalidTransaction),

    /// A response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The block is not known to the node.
    #[error("unknown block {0}")]
    UnknownBlock(BlockHash),

    /// The node does not offer this capability.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The connection was closed.
    #[error("node connection closed")]
    Closed,
}

impl NodeError {
    /// The pool rejection reason, if this is one.
    pub fn invalid_transaction(&self) -> Option<InvalidTransaction> {
        match self {
            NodeError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        NodeError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Decode(e.to_string())
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
