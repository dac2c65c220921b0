//! # Substor Node
//!
//! The boundary between the metadata adapter and a ledger node.
//!
//! ## Overview
//!
//! [`LedgerNode`] is the whole surface the adapter uses: chain identity
//! (runtime schema, genesis hash, runtime version), raw state reads, paged
//! key enumeration and transaction submission.
//!
//! Two implementations ship with this crate:
//!
//! - [`HttpNode`] - JSON-RPC against a running node, with the runtime schema
//!   decoded from its metadata and inclusion watching over a websocket
//! - [`MemoryLedger`] - an in-process development chain with a real
//!   transaction pool, block sealing and the metadata module's dispatch rules
//!
//! ## Pool Rules
//!
//! Both implementations report pool rejections as
//! [`NodeError::Rejected`] with an [`InvalidTransaction`] reason. A nonce
//! below the account nonce is `Stale`; a nonce equal to one already pending
//! is `PriorityTooLow`.

pub mod error;
pub mod http;
pub mod memory;
pub mod metadata;
pub mod node;

pub use error::{InvalidTransaction, NodeError, Result};
pub use http::{HttpNode, HttpNodeConfig};
pub use memory::{
    LedgerEvent, MemoryLedger, MemoryLedgerConfig, MetadataEvent, PoolStatus, SealMode,
};
pub use metadata::decode_runtime_schema;
pub use node::{
    DispatchError, DispatchOutcome, InclusionReceipt, LedgerNode, ModuleIndices,
};
