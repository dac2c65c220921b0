//! The chain session: what a connection learns about the ledger once.
//!
//! Schema, genesis hash and runtime version are fetched concurrently at
//! connect time and never refreshed. A runtime upgrade invalidates the
//! session; signatures made with a stale runtime version are rejected by
//! the pool as bad proofs.

use tracing::{debug, instrument};

use substor_core::{
    BlockHash, CallIndex, CallKind, ModuleLayout, RuntimeSchema, RuntimeVersion, SigningContext,
    StorageKeyCodec,
};
use substor_node::LedgerNode;

use crate::error::{Error, Operation, Result, ResultExt, Step};

/// Immutable per-connection chain facts, shared by every operation.
#[derive(Debug, Clone)]
pub struct ChainSession {
    schema: RuntimeSchema,
    genesis_hash: BlockHash,
    runtime_version: RuntimeVersion,
    layout: ModuleLayout,
    codec: StorageKeyCodec,
    set_call: CallIndex,
    delete_call: CallIndex,
    update_call: CallIndex,
}

impl ChainSession {
    /// Fetch the chain facts from `node` and resolve `layout` against the schema.
    #[instrument(skip_all, fields(pallet = %layout.pallet))]
    pub async fn connect(node: &dyn LedgerNode, layout: &ModuleLayout) -> Result<Self> {
        let (schema, genesis_hash, runtime_version) = tokio::try_join!(
            async {
                node.runtime_schema()
                    .await
                    .map_err(Error::ChainQuery)
                    .during(Operation::Connect, Step::FetchSchema)
            },
            async {
                node.genesis_hash()
                    .await
                    .map_err(Error::ChainQuery)
                    .during(Operation::Connect, Step::FetchGenesis)
            },
            async {
                node.runtime_version()
                    .await
                    .map_err(Error::ChainQuery)
                    .during(Operation::Connect, Step::FetchRuntimeVersion)
            },
        )?;

        let session = Self::from_parts(schema, genesis_hash, runtime_version, layout)
            .during(Operation::Connect, Step::ResolveSchema)?;

        debug!(
            genesis = %session.genesis_hash,
            spec_version = session.runtime_version.spec_version,
            "Chain session established"
        );
        Ok(session)
    }

    /// Build a session from facts fetched elsewhere.
    pub fn from_parts(
        schema: RuntimeSchema,
        genesis_hash: BlockHash,
        runtime_version: RuntimeVersion,
        layout: &ModuleLayout,
    ) -> Result<Self> {
        schema
            .ensure_storage(&layout.pallet, &layout.storage_item)
            .map_err(Error::Schema)?;
        schema
            .ensure_storage(&layout.system_pallet, &layout.account_item)
            .map_err(Error::Schema)?;

        let resolve = |kind: CallKind| {
            schema
                .call_index(&layout.pallet, kind.call_name(layout))
                .map_err(Error::Schema)
        };
        let set_call = resolve(CallKind::Set)?;
        let delete_call = resolve(CallKind::Delete)?;
        let update_call = resolve(CallKind::Update)?;

        Ok(Self {
            codec: StorageKeyCodec::new(layout),
            layout: layout.clone(),
            schema,
            genesis_hash,
            runtime_version,
            set_call,
            delete_call,
            update_call,
        })
    }

    pub fn schema(&self) -> &RuntimeSchema {
        &self.schema
    }

    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash
    }

    pub fn runtime_version(&self) -> RuntimeVersion {
        self.runtime_version
    }

    pub fn layout(&self) -> &ModuleLayout {
        &self.layout
    }

    /// Address derivation for this chain's layout.
    pub fn codec(&self) -> &StorageKeyCodec {
        &self.codec
    }

    /// The chain binding every signature commits to.
    pub fn signing_context(&self) -> SigningContext {
        SigningContext {
            genesis_hash: self.genesis_hash,
            runtime_version: self.runtime_version,
        }
    }

    /// Resolved index of a metadata call.
    pub fn call_index(&self, kind: CallKind) -> CallIndex {
        match kind {
            CallKind::Set => self.set_call,
            CallKind::Delete => self.delete_call,
            CallKind::Update => self.update_call,
        }
    }
}
