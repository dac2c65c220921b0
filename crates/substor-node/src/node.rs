//! The ledger node abstraction.
//!
//! The adapter needs six things from a node: the runtime schema, the genesis
//! hash, the runtime version, raw storage reads, paged key enumeration and
//! transaction submission. Implementations may speak JSON-RPC over HTTP,
//! websockets, or keep the whole ledger in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use substor_core::{
    BlockHash, CallIndex, CallKind, ModuleLayout, PalletSchema, RuntimeSchema, RuntimeVersion,
    SignedExtrinsic, StorageAddress, TxHash,
};

use crate::error::Result;

/// Runtime positions of the metadata module and the system pallet.
///
/// The in-memory ledger places its modules here; real nodes declare their
/// own positions in runtime metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleIndices {
    pub system_pallet: u8,
    pub pallet: u8,
    pub set_call: u8,
    pub delete_call: u8,
    pub update_call: u8,
}

impl Default for ModuleIndices {
    fn default() -> Self {
        Self {
            system_pallet: 0,
            pallet: 8,
            set_call: 0,
            delete_call: 1,
            update_call: 2,
        }
    }
}

impl ModuleIndices {
    /// A runtime schema declaring the system pallet and the metadata module.
    pub fn schema(&self, metadata: Vec<u8>, layout: &ModuleLayout) -> RuntimeSchema {
        RuntimeSchema::new(
            metadata,
            vec![
                PalletSchema::new(&layout.system_pallet, self.system_pallet)
                    .storage_item(&layout.account_item),
                PalletSchema::new(&layout.pallet, self.pallet)
                    .call(&layout.set_call, self.set_call)
                    .call(&layout.delete_call, self.delete_call)
                    .call(&layout.update_call, self.update_call)
                    .storage_item(&layout.storage_item),
            ],
        )
    }

    /// Which metadata call sits at `index`, if any.
    pub fn call_kind(&self, index: CallIndex) -> Option<CallKind> {
        if index.pallet != self.pallet {
            return None;
        }
        match index.call {
            c if c == self.set_call => Some(CallKind::Set),
            c if c == self.delete_call => Some(CallKind::Delete),
            c if c == self.update_call => Some(CallKind::Update),
            _ => None,
        }
    }

    /// The call index of `kind`.
    pub fn call_index(&self, kind: CallKind) -> CallIndex {
        let call = match kind {
            CallKind::Set => self.set_call,
            CallKind::Delete => self.delete_call,
            CallKind::Update => self.update_call,
        };
        CallIndex {
            pallet: self.pallet,
            call,
        }
    }
}

/// Errors raised by the metadata module when a transaction is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchError {
    /// `set_metadata` on a key that already exists.
    MetadataExists,
    /// `delete_metadata` or `update_metadata` on a key that does not exist.
    MetadataNotFound,
    /// The signer does not own the record.
    NoPermissions,
    /// Any other module error, by name.
    Other(String),
}

impl DispatchError {
    /// The error a module error variant name stands for.
    pub fn from_name(name: &str) -> Self {
        match name {
            "MetadataExists" => DispatchError::MetadataExists,
            "MetadataNotFound" => DispatchError::MetadataNotFound,
            "NoPermissions" => DispatchError::NoPermissions,
            other => DispatchError::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MetadataExists => f.write_str("MetadataExists"),
            DispatchError::MetadataNotFound => f.write_str("MetadataNotFound"),
            DispatchError::NoPermissions => f.write_str("NoPermissions"),
            DispatchError::Other(name) => f.write_str(name),
        }
    }
}

/// Result of executing an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failed(DispatchError),
}

impl DispatchOutcome {
    /// Whether the call took effect.
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

/// Proof that a transaction made it into a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionReceipt {
    pub tx_hash: TxHash,
    pub block_hash: BlockHash,
    pub block_number: u64,
    pub outcome: DispatchOutcome,
}

/// A connection to a ledger node.
///
/// Implementations must be thread-safe (Send + Sync). Reads with `at: None`
/// are made against the node's best block.
#[async_trait]
pub trait LedgerNode: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Chain identity
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch the runtime schema.
    async fn runtime_schema(&self) -> Result<RuntimeSchema>;

    /// Fetch the hash of block 0.
    async fn genesis_hash(&self) -> Result<BlockHash>;

    /// Fetch the current runtime version.
    async fn runtime_version(&self) -> Result<RuntimeVersion>;

    // ─────────────────────────────────────────────────────────────────────────
    // State queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Read the raw value at `address`. Returns None if nothing is stored there.
    async fn storage(
        &self,
        address: &StorageAddress,
        at: Option<BlockHash>,
    ) -> Result<Option<Vec<u8>>>;

    /// List up to `count` keys under `prefix`, in ascending byte order,
    /// strictly after `start_key` when one is given.
    async fn storage_keys_paged(
        &self,
        prefix: &StorageAddress,
        count: u32,
        start_key: Option<&StorageAddress>,
        at: Option<BlockHash>,
    ) -> Result<Vec<StorageAddress>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Hand a signed transaction to the pool. Returns once the pool accepts it.
    async fn submit(&self, extrinsic: &SignedExtrinsic) -> Result<TxHash>;

    /// Submit and wait until the transaction is included in a block.
    async fn submit_and_watch(&self, extrinsic: &SignedExtrinsic) -> Result<InclusionReceipt>;

    /// Release the connection. Idempotent.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_kind_resolution() {
        let indices = ModuleIndices::default();
        for kind in [CallKind::Set, CallKind::Delete, CallKind::Update] {
            assert_eq!(indices.call_kind(indices.call_index(kind)), Some(kind));
        }
        assert_eq!(indices.call_kind(CallIndex { pallet: 0, call: 0 }), None);
        assert_eq!(indices.call_kind(CallIndex { pallet: 8, call: 7 }), None);
    }

    #[test]
    fn test_dispatch_error_names() {
        for error in [
            DispatchError::MetadataExists,
            DispatchError::MetadataNotFound,
            DispatchError::NoPermissions,
            DispatchError::Other("BadOrigin".into()),
        ] {
            assert_eq!(DispatchError::from_name(&error.to_string()), error);
        }
    }

    #[test]
    fn test_schema_agrees_with_indices() {
        let layout = ModuleLayout::default();
        let indices = ModuleIndices {
            pallet: 40,
            ..Default::default()
        };
        let schema = indices.schema(Vec::new(), &layout);

        assert_eq!(
            schema.call_index(&layout.pallet, &layout.update_call).unwrap(),
            indices.call_index(CallKind::Update)
        );
        assert!(schema.ensure_storage(&layout.pallet, &layout.storage_item).is_ok());
        assert!(schema
            .ensure_storage(&layout.system_pallet, &layout.account_item)
            .is_ok());
    }
}
