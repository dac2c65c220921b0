//! Error types for the metadata adapter.
//!
//! Every failure an operation returns is wrapped in [`Error::Op`], naming the
//! operation and the sub-step that produced it. The wrapped error is one of
//! the category variants; [`Error::root`] reaches it.

use std::fmt;

use substor_core::{BlockHash, CoreError};
use substor_node::{DispatchError, InvalidTransaction, NodeError};
use thiserror::Error;

/// The adapter operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Set,
    Get,
    Delete,
    Update,
    ListKeys,
    Close,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Set => "set",
            Operation::Get => "get",
            Operation::Delete => "delete",
            Operation::Update => "update",
            Operation::ListKeys => "list_keys",
            Operation::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sub-step of an operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ValidateConfig,
    AcquireSession,
    FetchSchema,
    FetchGenesis,
    FetchRuntimeVersion,
    ResolveSchema,
    DeriveAddress,
    QueryState,
    Decode,
    Transform,
    FetchNonce,
    Sign,
    Submit,
    AwaitInclusion,
    ScanKeys,
    Release,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::ValidateConfig => "validate_config",
            Step::AcquireSession => "acquire_session",
            Step::FetchSchema => "fetch_schema",
            Step::FetchGenesis => "fetch_genesis",
            Step::FetchRuntimeVersion => "fetch_runtime_version",
            Step::ResolveSchema => "resolve_schema",
            Step::DeriveAddress => "derive_address",
            Step::QueryState => "query_state",
            Step::Decode => "decode",
            Step::Transform => "transform",
            Step::FetchNonce => "fetch_nonce",
            Step::Sign => "sign",
            Step::Submit => "submit",
            Step::AwaitInclusion => "await_inclusion",
            Step::ScanKeys => "scan_keys",
            Step::Release => "release",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during adapter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Canonical encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(CoreError),

    /// A storage address could not be derived.
    #[error("address derivation error: {0}")]
    AddressDerivation(CoreError),

    /// The node failed to answer a read.
    #[error("chain query error: {0}")]
    ChainQuery(NodeError),

    /// Nothing is stored at the requested address.
    #[error("not found")]
    NotFound,

    /// The transaction could not be signed.
    #[error("signing error: {0}")]
    Signing(CoreError),

    /// The node rejected or failed to accept a transaction.
    #[error("submission error: {0}")]
    Submission(NodeError),

    /// The transaction was included but its call failed.
    #[error("dispatch failed in block {block}: {reason}")]
    Dispatch {
        block: BlockHash,
        reason: DispatchError,
    },

    /// The runtime does not declare the module, a call or a storage item.
    #[error("schema error: {0}")]
    Schema(CoreError),

    /// Invalid adapter configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An update transform declined to produce a new value.
    #[error("update aborted: {0}")]
    UpdateAborted(String),

    /// The adapter has been closed.
    #[error("adapter closed")]
    Closed,

    /// An error with the operation and step that produced it.
    #[error("{op} failed at {step}: {source}")]
    Op {
        op: Operation,
        step: Step,
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap with the operation and step. An already wrapped error keeps its context.
    pub fn during(self, op: Operation, step: Step) -> Self {
        match self {
            Error::Op { .. } => self,
            other => Error::Op {
                op,
                step,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, without operation context.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Op { source, .. } = current {
            current = source;
        }
        current
    }

    /// The operation that failed, if recorded.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::Op { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// The step that failed, if recorded.
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Op { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether the root cause is a missing entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound)
    }

    /// Whether the root cause is a closed adapter or connection.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.root(),
            Error::Closed | Error::ChainQuery(NodeError::Closed) | Error::Submission(NodeError::Closed)
        )
    }

    /// The pool rejection reason, if the root cause is one.
    pub fn rejection(&self) -> Option<InvalidTransaction> {
        match self.root() {
            Error::Submission(e) => e.invalid_transaction(),
            _ => None,
        }
    }
}

/// Attach operation context to results.
pub trait ResultExt<T> {
    fn during(self, op: Operation, step: Step) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn during(self, op: Operation, step: Step) -> Result<T> {
        self.map_err(|e| e.during(op, step))
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_once() {
        let err = Error::NotFound
            .during(Operation::Get, Step::QueryState)
            .during(Operation::Update, Step::Transform);

        assert_eq!(err.operation(), Some(Operation::Get));
        assert_eq!(err.step(), Some(Step::QueryState));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "get failed at query_state: not found");
    }

    #[test]
    fn test_rejection_reaches_through_context() {
        let err: Result<()> = Err(Error::Submission(NodeError::Rejected(InvalidTransaction::Stale)));
        let err = err.during(Operation::Set, Step::Submit).unwrap_err();
        assert_eq!(err.rejection(), Some(InvalidTransaction::Stale));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error as _;
        let err = Error::Closed.during(Operation::Delete, Step::Submit);
        assert!(err.source().is_some());
        assert!(err.is_closed());
    }
}
