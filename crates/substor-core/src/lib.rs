//! # Substor Core
//!
//! Pure primitives for storing 0-stor style metadata on a Substrate ledger:
//! storage-key derivation, SCALE encoding, account keys and extrinsic signing.
//!
//! This crate contains no I/O and no networking. Everything here is a pure
//! function of its inputs, so the adapter and the ledger agree on bytes.
//!
//! ## Key Types
//!
//! - [`StorageKeyCodec`] - Turns `(namespace, key)` into the on-chain storage address
//! - [`StorageAddress`] - A fully derived storage key
//! - [`MetaCall`] - One of the metadata module's dispatchable calls
//! - [`PendingExtrinsic`] / [`SignedExtrinsic`] - A call before and after signing
//! - [`Keypair`] / [`AccountId`] - Ed25519 signing identity
//! - [`RuntimeSchema`] - The subset of runtime metadata the adapter resolves against
//!
//! ## Encoding
//!
//! All values that reach the ledger use SCALE. See the [`scale`] module.

pub mod crypto;
pub mod error;
pub mod extrinsic;
pub mod layout;
pub mod scale;
pub mod schema;
pub mod storage;
pub mod types;

pub use crypto::{
    blake2_128, blake2_256, twox_128, AccountId, Ed25519Signature, Keypair, TransactionSigner,
};
pub use error::{CoreError, Result};
pub use extrinsic::{
    signing_payload, AdditionalSigned, CallIndex, CallKind, EncodedCall, Era, MetaCall,
    PendingExtrinsic, SignedExtra, SignedExtrinsic, SigningContext, EXTRINSIC_VERSION,
};
pub use layout::ModuleLayout;
pub use schema::{CallSchema, PalletSchema, RuntimeSchema};
pub use storage::{StorageKeyCodec, StoredRecord};
pub use types::{AccountNonce, BlockHash, RuntimeVersion, StorageAddress, TxHash};
