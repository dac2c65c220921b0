//! The metadata store contract and its ledger-backed implementation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use substor_core::{
    AccountId, AccountNonce, CallKind, MetaCall, StorageAddress, StoredRecord, TransactionSigner,
};
use substor_node::{DispatchError, DispatchOutcome, LedgerNode};

use crate::builder::ExtrinsicBuilder;
use crate::config::{AbsentAccountPolicy, AdapterConfig, SubmissionMode};
use crate::error::{Error, Operation, Result, ResultExt, Step};
use crate::nonce::NonceSequencer;
use crate::session::ChainSession;

/// Produces the new value of a record from its current value.
///
/// Return `Error::UpdateAborted` to leave the record untouched.
pub type Transform<'a> = Box<dyn FnOnce(Vec<u8>) -> Result<Vec<u8>> + Send + 'a>;

/// A namespaced key-value store for metadata records.
///
/// Keys are scoped by namespace; the same key in two namespaces names two
/// records. Implementations must be safe to call concurrently.
///
/// Writes to the same `(namespace, key)` are not serialized. In particular
/// `update` is a read-modify-write without compare-and-swap: two concurrent
/// updates may both read the same base value, and at most one of them takes
/// effect. Callers that need ordering must serialize writes themselves.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store `metadata` under `(namespace, key)`, replacing any previous value.
    async fn set(&self, namespace: &[u8], key: &[u8], metadata: &[u8]) -> Result<()>;

    /// Fetch the value under `(namespace, key)`. Fails with `NotFound` if absent.
    async fn get(&self, namespace: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    /// Remove `(namespace, key)`. Removing an absent key succeeds.
    async fn delete(&self, namespace: &[u8], key: &[u8]) -> Result<()>;

    /// Replace the value under `(namespace, key)` with `transform(current)`.
    async fn update(&self, namespace: &[u8], key: &[u8], transform: Transform<'_>) -> Result<()>;

    /// Call `on_key` once per key stored in `namespace`, in ledger order.
    ///
    /// An empty namespace calls back zero times and succeeds.
    async fn list_keys(
        &self,
        namespace: &[u8],
        on_key: &mut (dyn for<'k> FnMut(&'k [u8]) + Send),
    ) -> Result<()>;

    /// Release the ledger connection. Idempotent; later operations fail with `Closed`.
    async fn close(&self) -> Result<()>;
}

/// Metadata store backed by a ledger node.
///
/// Reads are state queries at the node's best block. Writes are signed
/// transactions; with [`SubmissionMode::Pool`] they report success once the
/// transaction pool accepts them, which is not yet committed.
pub struct LedgerStore<N: LedgerNode> {
    node: Arc<N>,
    signer: Arc<dyn TransactionSigner>,
    config: AdapterConfig,
    session: RwLock<Option<Arc<ChainSession>>>,
}

impl<N: LedgerNode> LedgerStore<N> {
    /// Establish a chain session with `node` and create the store.
    #[instrument(skip_all, fields(account = %signer.account_id()))]
    pub async fn connect(
        node: Arc<N>,
        signer: Arc<dyn TransactionSigner>,
        config: AdapterConfig,
    ) -> Result<Self> {
        config
            .validate()
            .during(Operation::Connect, Step::ValidateConfig)?;
        let session = ChainSession::connect(node.as_ref(), &config.layout).await?;
        Ok(Self::with_session(node, signer, config, session))
    }

    /// Create the store over an already established session.
    pub fn with_session(
        node: Arc<N>,
        signer: Arc<dyn TransactionSigner>,
        config: AdapterConfig,
        session: ChainSession,
    ) -> Self {
        Self {
            node,
            signer,
            config,
            session: RwLock::new(Some(Arc::new(session))),
        }
    }

    /// The account transactions are signed for.
    pub fn account_id(&self) -> AccountId {
        self.signer.account_id()
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// The underlying node.
    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    /// The live chain session. Fails with `Closed` after `close`.
    pub fn session(&self) -> Result<Arc<ChainSession>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Closed)
    }

    fn session_for(&self, op: Operation) -> Result<Arc<ChainSession>> {
        self.session().during(op, Step::AcquireSession)
    }

    fn address(
        &self,
        session: &ChainSession,
        op: Operation,
        namespace: &[u8],
        key: &[u8],
    ) -> Result<StorageAddress> {
        session
            .codec()
            .derive_address(namespace, key)
            .map_err(Error::AddressDerivation)
            .during(op, Step::DeriveAddress)
    }

    async fn read(
        &self,
        session: &ChainSession,
        op: Operation,
        namespace: &[u8],
        key: &[u8],
    ) -> Result<Vec<u8>> {
        let address = self.address(session, op, namespace, key)?;
        let raw = self
            .node
            .storage(&address, None)
            .await
            .map_err(Error::ChainQuery)
            .during(op, Step::QueryState)?
            .ok_or(Error::NotFound)
            .during(op, Step::QueryState)?;

        let record = StoredRecord::decode_value(&raw)
            .map_err(Error::Encoding)
            .during(op, Step::Decode)?;
        trace!(owner = %record.owner, bytes = record.data.len(), "Read record");
        Ok(record.data)
    }

    async fn next_nonce(&self, session: &ChainSession, op: Operation) -> Result<AccountNonce> {
        let account = self.signer.account_id();
        let fetched = NonceSequencer::new(self.node.as_ref(), session)
            .next_nonce(&account)
            .await;

        match fetched {
            Err(Error::NotFound) if self.config.absent_account == AbsentAccountPolicy::AssumeZero => {
                Ok(AccountNonce::ZERO)
            }
            other => other.during(op, Step::FetchNonce),
        }
    }

    async fn write(&self, session: &ChainSession, op: Operation, call: MetaCall) -> Result<()> {
        let kind = call.kind();
        let builder = ExtrinsicBuilder::new(self.node.as_ref(), session, self.signer.as_ref());
        let pending = builder.build(call);
        let nonce = self.next_nonce(session, op).await?;
        let signed = builder.sign(pending, nonce).during(op, Step::Sign)?;

        match self.config.submission {
            SubmissionMode::Pool => {
                let hash = builder.submit(&signed).await.during(op, Step::Submit)?;
                debug!(call = %kind, tx = %hash, %nonce, "Submitted");
                Ok(())
            }
            SubmissionMode::InBlock => {
                let receipt = builder
                    .submit_and_watch(&signed)
                    .await
                    .during(op, Step::Submit)?;
                match receipt.outcome {
                    DispatchOutcome::Success => Ok(()),
                    DispatchOutcome::Failed(DispatchError::MetadataNotFound)
                        if kind == CallKind::Delete =>
                    {
                        debug!(tx = %receipt.tx_hash, "Record was already absent");
                        Ok(())
                    }
                    DispatchOutcome::Failed(reason) => {
                        warn!(call = %kind, tx = %receipt.tx_hash, %reason, "Dispatch failed");
                        Err(Error::Dispatch {
                            block: receipt.block_hash,
                            reason,
                        })
                        .during(op, Step::AwaitInclusion)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<N: LedgerNode> MetadataStore for LedgerStore<N> {
    #[instrument(skip_all, fields(ns = %hex::encode(namespace), key = %hex::encode(key)))]
    async fn set(&self, namespace: &[u8], key: &[u8], metadata: &[u8]) -> Result<()> {
        let session = self.session_for(Operation::Set)?;

        // The module only inserts new keys; existing ones are replaced by update_metadata.
        let exists = match self.read(&session, Operation::Set, namespace, key).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        let (namespace, key, metadata) = (namespace.to_vec(), key.to_vec(), metadata.to_vec());
        let call = if exists {
            MetaCall::Update {
                namespace,
                key,
                metadata,
            }
        } else {
            MetaCall::Set {
                namespace,
                key,
                metadata,
            }
        };
        self.write(&session, Operation::Set, call).await
    }

    #[instrument(skip_all, fields(ns = %hex::encode(namespace), key = %hex::encode(key)))]
    async fn get(&self, namespace: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let session = self.session_for(Operation::Get)?;
        self.read(&session, Operation::Get, namespace, key).await
    }

    #[instrument(skip_all, fields(ns = %hex::encode(namespace), key = %hex::encode(key)))]
    async fn delete(&self, namespace: &[u8], key: &[u8]) -> Result<()> {
        let session = self.session_for(Operation::Delete)?;
        let address = self.address(&session, Operation::Delete, namespace, key)?;
        trace!(address = %address.to_hex(), "Deleting record");

        let call = MetaCall::Delete {
            namespace: namespace.to_vec(),
            key: key.to_vec(),
        };
        self.write(&session, Operation::Delete, call).await
    }

    #[instrument(skip_all, fields(ns = %hex::encode(namespace), key = %hex::encode(key)))]
    async fn update(&self, namespace: &[u8], key: &[u8], transform: Transform<'_>) -> Result<()> {
        let session = self.session_for(Operation::Update)?;
        let current = self.read(&session, Operation::Update, namespace, key).await?;
        let metadata = transform(current).during(Operation::Update, Step::Transform)?;

        let call = MetaCall::Update {
            namespace: namespace.to_vec(),
            key: key.to_vec(),
            metadata,
        };
        self.write(&session, Operation::Update, call).await
    }

    #[instrument(skip_all, fields(ns = %hex::encode(namespace)))]
    async fn list_keys(
        &self,
        namespace: &[u8],
        on_key: &mut (dyn for<'k> FnMut(&'k [u8]) + Send),
    ) -> Result<()> {
        let session = self.session_for(Operation::ListKeys)?;
        let codec = session.codec();
        let prefix = codec
            .namespace_prefix(namespace)
            .map_err(Error::AddressDerivation)
            .during(Operation::ListKeys, Step::DeriveAddress)?;

        let page_size = self.config.key_page_size;
        let mut start: Option<StorageAddress> = None;
        let mut delivered = 0usize;

        loop {
            let page = self
                .node
                .storage_keys_paged(&prefix, page_size, start.as_ref(), None)
                .await
                .map_err(Error::ChainQuery)
                .during(Operation::ListKeys, Step::ScanKeys)?;

            for address in &page {
                let key = codec
                    .recover_key(&prefix, address.as_bytes())
                    .map_err(Error::Encoding)
                    .during(Operation::ListKeys, Step::Decode)?;
                on_key(key.as_slice());
                delivered += 1;
            }

            if page.len() < page_size as usize {
                break;
            }
            start = page.into_iter().last();
        }

        debug!(keys = delivered, "Listed namespace");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let released = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if released.is_some() {
            self.node
                .close()
                .await
                .map_err(Error::ChainQuery)
                .during(Operation::Close, Step::Release)?;
            debug!("Metadata store closed");
        }
        Ok(())
    }
}
