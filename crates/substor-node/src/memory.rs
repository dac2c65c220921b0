//! In-memory implementation of the LedgerNode trait.
//!
//! Behaves like a single-node development chain running the metadata module:
//! a transaction pool that checks signatures and nonces on submission, block
//! sealing that dispatches calls against an ordered state map, and state
//! snapshots of the most recent blocks for historical reads. Nothing is
//! persisted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use substor_core::{
    AccountId, AccountNonce, BlockHash, MetaCall, ModuleLayout, RuntimeSchema, RuntimeVersion,
    SignedExtrinsic, SigningContext, StorageAddress, StorageKeyCodec, StoredRecord, TxHash,
};

use crate::error::{InvalidTransaction, NodeError, Result};
use crate::node::{DispatchError, DispatchOutcome, InclusionReceipt, LedgerNode, ModuleIndices};

/// Opaque metadata bytes served by `runtime_schema`: the `meta` magic and format version 14.
const METADATA_BYTES: [u8; 5] = [0x6d, 0x65, 0x74, 0x61, 14];

/// Furthest a nonce may run ahead of the next expected one and still be held.
const MAX_FUTURE_GAP: u32 = 64;

type State = BTreeMap<Vec<u8>, Vec<u8>>;

/// When accepted transactions are put into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealMode {
    /// Seal a block as soon as a transaction becomes ready.
    #[default]
    Instant,
    /// Seal only on [`MemoryLedger::seal_block`].
    Manual,
}

/// Configuration for the in-memory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLedgerConfig {
    /// Chain name; the genesis hash is derived from it.
    pub chain: String,
    /// When to seal blocks.
    pub seal_mode: SealMode,
    /// Runtime version signatures must commit to.
    pub runtime_version: RuntimeVersion,
    /// Reject transactions from accounts with no free balance.
    pub require_funded_accounts: bool,
    /// Names of the metadata module and system pallet.
    pub layout: ModuleLayout,
    /// Positions of the metadata module and system pallet.
    pub indices: ModuleIndices,
    /// How many recent block states stay readable by hash. At least one.
    pub state_history: usize,
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        Self {
            chain: "dev".to_string(),
            seal_mode: SealMode::Instant,
            runtime_version: RuntimeVersion {
                spec_version: 100,
                transaction_version: 1,
            },
            require_funded_accounts: false,
            layout: ModuleLayout::default(),
            indices: ModuleIndices::default(),
            state_history: 256,
        }
    }
}

/// The `System.Account` value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
struct AccountInfo {
    nonce: u32,
    consumers: u32,
    providers: u32,
    sufficients: u32,
    free: u128,
    reserved: u128,
    frozen: u128,
    flags: u128,
}

/// Something the metadata module did while dispatching a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataEvent {
    Created {
        namespace: Vec<u8>,
        key: Vec<u8>,
        owner: AccountId,
    },
    Updated {
        namespace: Vec<u8>,
        key: Vec<u8>,
        owner: AccountId,
    },
    Removed {
        namespace: Vec<u8>,
        key: Vec<u8>,
        owner: AccountId,
    },
    /// The transaction was included but its call failed.
    ExtrinsicFailed(DispatchError),
}

/// An event with the block and transaction it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub event: MetadataEvent,
}

/// Pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Transactions that will go into the next block.
    pub ready: usize,
    /// Transactions waiting for an earlier nonce.
    pub future: usize,
}

enum Placement {
    Ready,
    Future,
}

struct PoolEntry {
    hash: TxHash,
    extrinsic: SignedExtrinsic,
    call: MetaCall,
}

struct Inner {
    head: BlockHash,
    number: u64,
    best: Arc<State>,
    states: HashMap<BlockHash, Arc<State>>,
    /// Blocks in `states`, oldest first.
    history: VecDeque<BlockHash>,
    ready: Vec<PoolEntry>,
    future: Vec<PoolEntry>,
    watchers: HashMap<TxHash, oneshot::Sender<InclusionReceipt>>,
    events: Vec<LedgerEvent>,
    closed: bool,
}

/// An in-memory ledger running the metadata module.
///
/// Thread-safe via Mutex; share it behind an `Arc`.
pub struct MemoryLedger {
    config: MemoryLedgerConfig,
    genesis: BlockHash,
    codec: StorageKeyCodec,
    schema: RuntimeSchema,
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    /// Create a ledger with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryLedgerConfig::default())
    }

    /// Create a ledger with custom configuration.
    pub fn with_config(config: MemoryLedgerConfig) -> Self {
        let genesis = BlockHash(*blake3::hash(config.chain.as_bytes()).as_bytes());
        let codec = StorageKeyCodec::new(&config.layout);
        let schema = config
            .indices
            .schema(METADATA_BYTES.to_vec(), &config.layout);

        let genesis_state = Arc::new(State::new());
        let mut states = HashMap::new();
        states.insert(genesis, Arc::clone(&genesis_state));

        Self {
            config,
            genesis,
            codec,
            schema,
            inner: Mutex::new(Inner {
                head: genesis,
                number: 0,
                best: genesis_state,
                states,
                history: VecDeque::from([genesis]),
                ready: Vec::new(),
                future: Vec::new(),
                watchers: HashMap::new(),
                events: Vec::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The chain binding transactions for this ledger must be signed with.
    pub fn signing_context(&self) -> SigningContext {
        SigningContext {
            genesis_hash: self.genesis,
            runtime_version: self.config.runtime_version,
        }
    }

    /// Give `account` a free balance, creating its account entry if needed.
    pub fn fund_account(&self, account: &AccountId, free: u128) {
        let mut inner = self.lock();
        let address = self.codec.account_address(account);
        let mut info = self.account_info(&inner.best, account).unwrap_or(AccountInfo {
            providers: 1,
            ..AccountInfo::default()
        });
        info.free = free;

        let head = inner.head;
        let best = Arc::make_mut(&mut inner.best);
        best.insert(address.into_bytes(), info.encode());
        let best = Arc::clone(&inner.best);
        inner.states.insert(head, best);
    }

    /// Seal the ready transactions into a new block.
    pub fn seal_block(&self) -> Result<BlockHash> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(NodeError::Closed);
        }
        Ok(self.seal(&mut inner))
    }

    /// Number of the best block.
    pub fn block_number(&self) -> u64 {
        self.lock().number
    }

    /// Hash of the best block.
    pub fn best_hash(&self) -> BlockHash {
        self.lock().head
    }

    /// All events recorded so far, oldest first.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.lock().events.clone()
    }

    /// A copy of the best state.
    pub fn storage_snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        (*self.lock().best).clone()
    }

    /// Current pool occupancy.
    pub fn pool_status(&self) -> PoolStatus {
        let inner = self.lock();
        PoolStatus {
            ready: inner.ready.len(),
            future: inner.future.len(),
        }
    }

    /// The nonce the ledger holds for `account` at the best block.
    pub fn account_nonce(&self, account: &AccountId) -> AccountNonce {
        let inner = self.lock();
        AccountNonce(self.account_info(&inner.best, account).map_or(0, |info| info.nonce))
    }

    fn account_info(&self, state: &State, account: &AccountId) -> Option<AccountInfo> {
        let address = self.codec.account_address(account);
        state
            .get(address.as_bytes())
            .and_then(|raw| AccountInfo::decode(&mut raw.as_slice()).ok())
    }

    fn decode_call(&self, extrinsic: &SignedExtrinsic) -> Option<MetaCall> {
        let kind = self.config.indices.call_kind(extrinsic.call.index()?)?;
        MetaCall::decode_args(kind, extrinsic.call.args()).ok()
    }

    fn validate(
        &self,
        inner: &Inner,
        extrinsic: &SignedExtrinsic,
    ) -> std::result::Result<(MetaCall, Placement), InvalidTransaction> {
        extrinsic
            .verify(&self.signing_context())
            .map_err(|_| InvalidTransaction::BadProof)?;

        let call = self.decode_call(extrinsic).ok_or(InvalidTransaction::Malformed)?;

        let signer = extrinsic.signer;
        let info = self.account_info(&inner.best, &signer);
        if self.config.require_funded_accounts && info.map_or(true, |i| i.free == 0) {
            return Err(InvalidTransaction::Payment);
        }

        let account_nonce = info.map_or(0, |i| i.nonce);
        let nonce = extrinsic.extra.nonce;
        if nonce < account_nonce {
            return Err(InvalidTransaction::Stale);
        }

        let already_pending = inner
            .ready
            .iter()
            .chain(inner.future.iter())
            .any(|e| e.extrinsic.signer == signer && e.extrinsic.extra.nonce == nonce);
        if already_pending {
            return Err(InvalidTransaction::PriorityTooLow);
        }

        let expected = account_nonce + Self::ready_count(inner, &signer);
        if nonce == expected {
            Ok((call, Placement::Ready))
        } else if nonce.saturating_sub(expected) > MAX_FUTURE_GAP {
            Err(InvalidTransaction::Future)
        } else {
            Ok((call, Placement::Future))
        }
    }

    fn ready_count(inner: &Inner, signer: &AccountId) -> u32 {
        inner
            .ready
            .iter()
            .filter(|e| e.extrinsic.signer == *signer)
            .count() as u32
    }

    /// Move future transactions of `signer` whose turn has come into the ready queue.
    fn promote(&self, inner: &mut Inner, signer: &AccountId) {
        loop {
            let account_nonce = self.account_info(&inner.best, signer).map_or(0, |i| i.nonce);
            let expected = account_nonce + Self::ready_count(inner, signer);
            let position = inner
                .future
                .iter()
                .position(|e| e.extrinsic.signer == *signer && e.extrinsic.extra.nonce == expected);
            match position {
                Some(i) => {
                    let entry = inner.future.remove(i);
                    trace!(tx = %entry.hash, nonce = expected, "Promoted future transaction");
                    inner.ready.push(entry);
                }
                None => break,
            }
        }
    }

    fn submit_inner(
        &self,
        extrinsic: &SignedExtrinsic,
        watcher: Option<oneshot::Sender<InclusionReceipt>>,
    ) -> Result<TxHash> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(NodeError::Closed);
        }

        let hash = extrinsic.hash();
        let (call, placement) = self.validate(&inner, extrinsic).map_err(|reason| {
            debug!(tx = %hash, nonce = extrinsic.extra.nonce, %reason, "Pool rejected transaction");
            NodeError::Rejected(reason)
        })?;

        if let Some(watcher) = watcher {
            inner.watchers.insert(hash, watcher);
        }

        let signer = extrinsic.signer;
        let entry = PoolEntry {
            hash,
            extrinsic: extrinsic.clone(),
            call,
        };
        match placement {
            Placement::Ready => {
                trace!(tx = %hash, "Transaction ready");
                inner.ready.push(entry);
                self.promote(&mut inner, &signer);
            }
            Placement::Future => {
                trace!(tx = %hash, "Transaction held for an earlier nonce");
                inner.future.push(entry);
            }
        }

        if self.config.seal_mode == SealMode::Instant && !inner.ready.is_empty() {
            self.seal(&mut inner);
        }

        Ok(hash)
    }

    fn seal(&self, inner: &mut Inner) -> BlockHash {
        let entries = std::mem::take(&mut inner.ready);
        let number = inner.number + 1;
        let mut state = (*inner.best).clone();

        let mut hasher = blake3::Hasher::new();
        hasher.update(inner.head.as_bytes());
        hasher.update(&number.to_le_bytes());

        let mut applied = Vec::with_capacity(entries.len());
        for entry in entries {
            hasher.update(entry.hash.as_bytes());
            let signer = entry.extrinsic.signer;
            self.bump_nonce(&mut state, &signer);
            let result = self.dispatch(&mut state, &signer, &entry.call);
            applied.push((entry.hash, result));
        }

        let hash = BlockHash(*hasher.finalize().as_bytes());
        let state = Arc::new(state);
        inner.head = hash;
        inner.number = number;
        inner.states.insert(hash, Arc::clone(&state));
        inner.history.push_back(hash);
        while inner.history.len() > self.config.state_history.max(1) {
            if let Some(pruned) = inner.history.pop_front() {
                inner.states.remove(&pruned);
            }
        }
        inner.best = state;

        debug!(block = number, %hash, extrinsics = applied.len(), "Sealed block");

        for (tx_hash, result) in applied {
            let (outcome, event) = match result {
                Ok(event) => (DispatchOutcome::Success, event),
                Err(error) => (
                    DispatchOutcome::Failed(error.clone()),
                    MetadataEvent::ExtrinsicFailed(error),
                ),
            };
            inner.events.push(LedgerEvent {
                block_number: number,
                tx_hash,
                event,
            });
            if let Some(watcher) = inner.watchers.remove(&tx_hash) {
                let _ = watcher.send(InclusionReceipt {
                    tx_hash,
                    block_hash: hash,
                    block_number: number,
                    outcome,
                });
            }
        }

        let mut waiting: Vec<AccountId> = inner.future.iter().map(|e| e.extrinsic.signer).collect();
        waiting.sort();
        waiting.dedup();
        for signer in waiting {
            self.promote(inner, &signer);
        }

        hash
    }

    fn bump_nonce(&self, state: &mut State, account: &AccountId) {
        let mut info = self.account_info(state, account).unwrap_or(AccountInfo {
            providers: 1,
            ..AccountInfo::default()
        });
        info.nonce = info.nonce.saturating_add(1);
        state.insert(self.codec.account_address(account).into_bytes(), info.encode());
    }

    fn dispatch(
        &self,
        state: &mut State,
        signer: &AccountId,
        call: &MetaCall,
    ) -> std::result::Result<MetadataEvent, DispatchError> {
        let address = self
            .codec
            .derive_address(call.namespace(), call.key())
            .map_err(|e| DispatchError::Other(e.to_string()))?;
        let existing = state
            .get(address.as_bytes())
            .map(|raw| StoredRecord::decode_value(raw))
            .transpose()
            .map_err(|e| DispatchError::Other(e.to_string()))?;

        match call {
            MetaCall::Set {
                namespace,
                key,
                metadata,
            } => {
                if existing.is_some() {
                    return Err(DispatchError::MetadataExists);
                }
                let record = StoredRecord {
                    data: metadata.clone(),
                    owner: *signer,
                };
                state.insert(address.into_bytes(), record.encode());
                Ok(MetadataEvent::Created {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    owner: *signer,
                })
            }
            MetaCall::Delete { namespace, key } => {
                let record = existing.ok_or(DispatchError::MetadataNotFound)?;
                if record.owner != *signer {
                    return Err(DispatchError::NoPermissions);
                }
                state.remove(address.as_bytes());
                Ok(MetadataEvent::Removed {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    owner: *signer,
                })
            }
            MetaCall::Update {
                namespace,
                key,
                metadata,
            } => {
                let mut record = existing.ok_or(DispatchError::MetadataNotFound)?;
                if record.owner != *signer {
                    return Err(DispatchError::NoPermissions);
                }
                record.data = metadata.clone();
                state.insert(address.into_bytes(), record.encode());
                Ok(MetadataEvent::Updated {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    owner: *signer,
                })
            }
        }
    }

    fn state_at(&self, inner: &Inner, at: Option<BlockHash>) -> Result<Arc<State>> {
        match at {
            None => Ok(Arc::clone(&inner.best)),
            Some(hash) => inner
                .states
                .get(&hash)
                .cloned()
                .ok_or(NodeError::UnknownBlock(hash)),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerNode for MemoryLedger {
    async fn runtime_schema(&self) -> Result<RuntimeSchema> {
        if self.lock().closed {
            return Err(NodeError::Closed);
        }
        Ok(self.schema.clone())
    }

    async fn genesis_hash(&self) -> Result<BlockHash> {
        if self.lock().closed {
            return Err(NodeError::Closed);
        }
        Ok(self.genesis)
    }

    async fn runtime_version(&self) -> Result<RuntimeVersion> {
        if self.lock().closed {
            return Err(NodeError::Closed);
        }
        Ok(self.config.runtime_version)
    }

    async fn storage(
        &self,
        address: &StorageAddress,
        at: Option<BlockHash>,
    ) -> Result<Option<Vec<u8>>> {
        let inner = self.lock();
        if inner.closed {
            return Err(NodeError::Closed);
        }
        let state = self.state_at(&inner, at)?;
        Ok(state.get(address.as_bytes()).cloned())
    }

    async fn storage_keys_paged(
        &self,
        prefix: &StorageAddress,
        count: u32,
        start_key: Option<&StorageAddress>,
        at: Option<BlockHash>,
    ) -> Result<Vec<StorageAddress>> {
        let inner = self.lock();
        if inner.closed {
            return Err(NodeError::Closed);
        }
        let state = self.state_at(&inner, at)?;

        let lower = match start_key {
            Some(start) if start.as_bytes() >= prefix.as_bytes() => {
                Bound::Excluded(start.as_bytes().to_vec())
            }
            _ => Bound::Included(prefix.as_bytes().to_vec()),
        };

        Ok(state
            .range((lower, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix.as_bytes()))
            .take(count as usize)
            .map(|k| StorageAddress(k.clone()))
            .collect())
    }

    async fn submit(&self, extrinsic: &SignedExtrinsic) -> Result<TxHash> {
        self.submit_inner(extrinsic, None)
    }

    async fn submit_and_watch(&self, extrinsic: &SignedExtrinsic) -> Result<InclusionReceipt> {
        let (tx, rx) = oneshot::channel();
        self.submit_inner(extrinsic, Some(tx))?;
        rx.await.map_err(|_| NodeError::Closed)
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            inner.ready.clear();
            inner.future.clear();
            inner.watchers.clear();
            debug!("Memory ledger closed");
        }
        Ok(())
    }
}
