//! # Substor
//!
//! A namespaced metadata store on top of a Substrate ledger.
//!
//! ## Overview
//!
//! Metadata records live in a double map of the ledger's metadata module,
//! keyed by `(namespace, key)` and owned by the account that created them.
//! Reads are state queries; writes are signed transactions.
//!
//! - **Set / Update / Delete** build a call, fetch the signer's nonce, sign
//!   for the connected chain and submit
//! - **Get** derives the storage address and decodes the stored record
//! - **ListKeys** scans the namespace prefix page by page and strips it to
//!   recover the logical keys
//! - **Close** releases the node connection
//!
//! ## Consistency
//!
//! Writes are not serialized. Two writes from the same account that fetch
//! the nonce concurrently race for one transaction slot, and `update` is a
//! read-modify-write with no compare-and-swap. Nothing is retried: a stale
//! nonce comes back as a submission error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use substor::{AdapterConfig, LedgerStore, MetadataStore};
//! use substor::core::Keypair;
//! use substor::node::{HttpNode, HttpNodeConfig};
//!
//! async fn example() -> substor::Result<()> {
//!     let node = HttpNode::new(HttpNodeConfig::default()).map_err(substor::Error::ChainQuery)?;
//!     let signer = Arc::new(Keypair::from_seed(&[7u8; 32]));
//!     let store = LedgerStore::connect(Arc::new(node), signer, AdapterConfig::default()).await?;
//!
//!     store.set(b"bucket", b"object-1", b"chunk layout").await?;
//!     let metadata = store.get(b"bucket", b"object-1").await?;
//!     assert_eq!(metadata, b"chunk layout");
//!
//!     store.close().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `substor::core` - Encoding, key derivation and signing primitives
//! - `substor::node` - The node trait, the in-memory ledger and the HTTP node

pub mod adapter;
pub mod builder;
pub mod config;
pub mod error;
pub mod nonce;
pub mod session;

// Re-export component crates
pub use substor_core as core;
pub use substor_node as node;

pub use adapter::{LedgerStore, MetadataStore, Transform};
pub use builder::ExtrinsicBuilder;
pub use config::{AbsentAccountPolicy, AdapterConfig, SubmissionMode};
pub use error::{Error, Operation, Result, ResultExt, Step};
pub use nonce::NonceSequencer;
pub use session::ChainSession;

pub use substor_core::{AccountId, Keypair, ModuleLayout, StorageKeyCodec, TransactionSigner};
