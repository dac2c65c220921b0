//! JSON-RPC implementation of the LedgerNode trait.
//!
//! Request/response methods go over HTTP with `0x`-prefixed hex payloads:
//!
//! | capability           | method                    |
//! |----------------------|---------------------------|
//! | runtime schema       | `state_getMetadata`       |
//! | genesis hash         | `chain_getBlockHash [0]`  |
//! | runtime version      | `state_getRuntimeVersion` |
//! | storage read         | `state_getStorage`        |
//! | key enumeration      | `state_getKeysPaged`      |
//! | submission           | `author_submitExtrinsic`  |
//!
//! The runtime schema is decoded from the fetched metadata, so pallet and
//! call indices are whatever the running runtime declares. Inclusion
//! watching needs a subscription and goes through a `subxt` client on the
//! websocket endpoint, connected on first use.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use subxt::backend::rpc::RpcClient;
use subxt::error::DispatchError as RuntimeDispatchError;
use subxt::tx::{SubmittableExtrinsic, TxStatus};
use subxt::{OnlineClient, PolkadotConfig};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, trace, warn};

use substor_core::{
    BlockHash, RuntimeSchema, RuntimeVersion, SignedExtrinsic, StorageAddress, TxHash,
};

use crate::error::{InvalidTransaction, NodeError, Result};
use crate::metadata::decode_runtime_schema;
use crate::node::{DispatchError, DispatchOutcome, InclusionReceipt, LedgerNode};

/// Pool rejected the transaction as invalid; `data` carries the reason.
const RPC_INVALID_TRANSACTION: i64 = 1010;

/// A transaction with the same nonce is already in the pool.
const RPC_PRIORITY_TOO_LOW: i64 = 1014;

/// Configuration for a JSON-RPC node connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpNodeConfig {
    /// Node HTTP RPC endpoint.
    pub url: String,
    /// Node websocket endpoint used to watch submissions. `None` disables watching.
    ///
    /// Non-local endpoints must use `wss://`.
    pub ws_url: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpNodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9933".to_string(),
            ws_url: Some("ws://127.0.0.1:9944".to_string()),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// A ledger node reached over JSON-RPC.
pub struct HttpNode {
    client: Client,
    config: HttpNodeConfig,
    watcher: OnceCell<OnlineClient<PolkadotConfig>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpNode {
    /// Create a client for the node at `config.url`. No request is made.
    pub fn new(config: HttpNodeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            watcher: OnceCell::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// The node endpoint.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(NodeError::Closed)
        } else {
            Ok(())
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.ensure_open()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        trace!(method, id, "JSON-RPC request");

        let response = self.client.post(&self.config.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(NodeError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let response: RpcResponse = serde_json::from_str(&text)?;
        if let Some(error) = response.error {
            debug!(method, code = error.code, message = %error.message, "JSON-RPC error");
            return Err(map_rpc_error(error));
        }
        Ok(serde_json::from_value(response.result)?)
    }

    /// The subscription client, connected on first use.
    async fn watcher(&self) -> Result<&OnlineClient<PolkadotConfig>> {
        let url = self.config.ws_url.as_deref().ok_or_else(|| {
            NodeError::Unsupported("inclusion watching requires a websocket endpoint".into())
        })?;

        self.watcher
            .get_or_try_init(|| async {
                debug!(url, "Connecting subscription client");
                let rpc = RpcClient::from_url(url).await.map_err(map_subxt_error)?;
                OnlineClient::<PolkadotConfig>::from_rpc_client(rpc)
                    .await
                    .map_err(map_subxt_error)
            })
            .await
    }
}

/// Map a JSON-RPC error to a node error, recognising pool rejections.
fn map_rpc_error(error: RpcErrorObject) -> NodeError {
    let reason = match error.code {
        RPC_PRIORITY_TOO_LOW => Some(InvalidTransaction::PriorityTooLow),
        RPC_INVALID_TRANSACTION => {
            let detail = match &error.data {
                Some(Value::String(s)) => s.to_lowercase(),
                Some(other) => other.to_string().to_lowercase(),
                None => error.message.to_lowercase(),
            };
            classify_invalid(&detail)
        }
        _ => None,
    };

    match reason {
        Some(reason) => NodeError::Rejected(reason),
        None => NodeError::Rpc {
            code: error.code,
            message: match error.data {
                Some(data) => format!("{}: {}", error.message, data),
                None => error.message,
            },
        },
    }
}

fn classify_invalid(detail: &str) -> Option<InvalidTransaction> {
    if detail.contains("outdated") || detail.contains("stale") {
        Some(InvalidTransaction::Stale)
    } else if detail.contains("future") {
        Some(InvalidTransaction::Future)
    } else if detail.contains("bad signature") || detail.contains("badproof") {
        Some(InvalidTransaction::BadProof)
    } else if detail.contains("pay") {
        Some(InvalidTransaction::Payment)
    } else if detail.contains("decode") || detail.contains("call") {
        Some(InvalidTransaction::Malformed)
    } else {
        None
    }
}

/// Recognise a pool rejection in an error message from the subscription client.
fn classify_message(message: &str) -> Option<InvalidTransaction> {
    let message = message.to_lowercase();
    if message.contains("1014") || message.contains("priority is too low") {
        Some(InvalidTransaction::PriorityTooLow)
    } else if message.contains("1010") || message.contains("invalid transaction") {
        classify_invalid(&message)
    } else {
        None
    }
}

fn map_subxt_error(error: subxt::Error) -> NodeError {
    let message = error.to_string();
    match classify_message(&message) {
        Some(reason) => NodeError::Rejected(reason),
        None => NodeError::Transport(message),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn from_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| NodeError::Decode(format!("invalid hex {:?}: {}", s, e)))
}

fn hash32(s: &str) -> Result<[u8; 32]> {
    let bytes = from_hex(s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| NodeError::Decode(format!("expected 32-byte hash, got {} bytes", bytes.len())))
}

#[async_trait]
impl LedgerNode for HttpNode {
    #[instrument(skip_all, fields(url = %self.config.url))]
    async fn runtime_schema(&self) -> Result<RuntimeSchema> {
        let metadata: String = self.request("state_getMetadata", json!([])).await?;
        let schema = decode_runtime_schema(from_hex(&metadata)?)?;
        debug!(
            bytes = schema.metadata.len(),
            pallets = schema.pallets.len(),
            "Decoded runtime metadata"
        );
        Ok(schema)
    }

    async fn genesis_hash(&self) -> Result<BlockHash> {
        let hash: Option<String> = self.request("chain_getBlockHash", json!([0])).await?;
        let hash = hash.ok_or_else(|| NodeError::Decode("node reports no genesis block".into()))?;
        Ok(BlockHash(hash32(&hash)?))
    }

    async fn runtime_version(&self) -> Result<RuntimeVersion> {
        self.request("state_getRuntimeVersion", json!([])).await
    }

    async fn storage(
        &self,
        address: &StorageAddress,
        at: Option<BlockHash>,
    ) -> Result<Option<Vec<u8>>> {
        let value: Option<String> = self
            .request(
                "state_getStorage",
                json!([to_hex(address.as_bytes()), at.map(|h| h.to_string())]),
            )
            .await?;
        value.as_deref().map(from_hex).transpose()
    }

    async fn storage_keys_paged(
        &self,
        prefix: &StorageAddress,
        count: u32,
        start_key: Option<&StorageAddress>,
        at: Option<BlockHash>,
    ) -> Result<Vec<StorageAddress>> {
        let keys: Vec<String> = self
            .request(
                "state_getKeysPaged",
                json!([
                    to_hex(prefix.as_bytes()),
                    count,
                    start_key.map(|k| to_hex(k.as_bytes())),
                    at.map(|h| h.to_string()),
                ]),
            )
            .await?;
        keys.iter()
            .map(|k| from_hex(k).map(StorageAddress))
            .collect()
    }

    #[instrument(skip_all, fields(nonce = extrinsic.extra.nonce))]
    async fn submit(&self, extrinsic: &SignedExtrinsic) -> Result<TxHash> {
        let hash: String = self
            .request("author_submitExtrinsic", json!([to_hex(&extrinsic.encode())]))
            .await?;
        Ok(TxHash(hash32(&hash)?))
    }

    #[instrument(skip_all, fields(nonce = extrinsic.extra.nonce))]
    async fn submit_and_watch(&self, extrinsic: &SignedExtrinsic) -> Result<InclusionReceipt> {
        self.ensure_open()?;
        let client = self.watcher().await?;
        let tx_hash = extrinsic.hash();

        let tx: SubmittableExtrinsic<PolkadotConfig, _> =
            SubmittableExtrinsic::from_bytes(client.clone(), extrinsic.encode());
        let mut progress = tx.submit_and_watch().await.map_err(map_subxt_error)?;

        while let Some(status) = progress.next().await {
            let in_block = match status.map_err(map_subxt_error)? {
                TxStatus::InBestBlock(in_block) | TxStatus::InFinalizedBlock(in_block) => in_block,
                TxStatus::Invalid { message }
                | TxStatus::Dropped { message }
                | TxStatus::Error { message } => {
                    warn!(tx = %tx_hash, %message, "Transaction left the pool");
                    return Err(match classify_message(&message) {
                        Some(reason) => NodeError::Rejected(reason),
                        None => NodeError::Transport(message),
                    });
                }
                _ => continue,
            };

            let block_hash = BlockHash(in_block.block_hash().0);
            let block = client
                .blocks()
                .at(in_block.block_hash())
                .await
                .map_err(map_subxt_error)?;

            let outcome = match in_block.wait_for_success().await {
                Ok(_) => DispatchOutcome::Success,
                Err(subxt::Error::Runtime(RuntimeDispatchError::Module(error))) => {
                    let details = error
                        .details()
                        .map_err(|e| NodeError::Decode(e.to_string()))?;
                    DispatchOutcome::Failed(DispatchError::from_name(&details.variant.name))
                }
                Err(e) => return Err(map_subxt_error(e)),
            };

            debug!(tx = %tx_hash, block = %block_hash, "Transaction included");
            return Ok(InclusionReceipt {
                tx_hash,
                block_hash,
                block_number: block.number() as u64,
                outcome,
            });
        }

        Err(NodeError::Transport(
            "subscription ended before the transaction was included".into(),
        ))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(url = %self.config.url, "HTTP node closed");
        }
        Ok(())
    }
}
