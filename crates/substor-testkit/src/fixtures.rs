//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an in-memory ledger and a
//! store connected to it with a deterministic signing key.

use std::sync::Arc;

use substor::{AdapterConfig, LedgerStore, SubmissionMode};
use substor_core::{AccountId, Keypair};
use substor_node::{MemoryLedger, MemoryLedgerConfig, SealMode};

/// Seed used when a fixture is built without one.
pub const DEFAULT_SEED: [u8; 32] = [0x42; 32];

/// A ledger with one connected store.
pub struct TestFixture {
    pub keypair: Keypair,
    pub ledger: Arc<MemoryLedger>,
    pub store: LedgerStore<MemoryLedger>,
}

impl TestFixture {
    /// Instant sealing, pool submission.
    pub async fn new() -> Self {
        Self::with_seed(DEFAULT_SEED).await
    }

    /// Instant sealing, pool submission, key from `seed`.
    pub async fn with_seed(seed: [u8; 32]) -> Self {
        Self::build(seed, MemoryLedgerConfig::default(), AdapterConfig::default()).await
    }

    /// Blocks are sealed only by [`TestFixture::seal`]. Writes report success
    /// at pool acceptance, so the ledger state lags until the next seal.
    pub async fn manual_seal() -> Self {
        let ledger = MemoryLedgerConfig {
            seal_mode: SealMode::Manual,
            ..Default::default()
        };
        Self::build(DEFAULT_SEED, ledger, AdapterConfig::default()).await
    }

    /// Writes wait for inclusion and report dispatch failures.
    pub async fn in_block() -> Self {
        let adapter = AdapterConfig {
            submission: SubmissionMode::InBlock,
            ..Default::default()
        };
        Self::build(DEFAULT_SEED, MemoryLedgerConfig::default(), adapter).await
    }

    /// Any combination of ledger and adapter settings.
    ///
    /// Panics if the store cannot connect.
    pub async fn build(seed: [u8; 32], ledger: MemoryLedgerConfig, adapter: AdapterConfig) -> Self {
        let keypair = Keypair::from_seed(&seed);
        let ledger = Arc::new(MemoryLedger::with_config(ledger));
        let store = LedgerStore::connect(Arc::clone(&ledger), Arc::new(keypair.clone()), adapter)
            .await
            .expect("store connects to the in-memory ledger");

        Self {
            keypair,
            ledger,
            store,
        }
    }

    /// The account every write of this fixture is signed by.
    pub fn account_id(&self) -> AccountId {
        self.keypair.account_id()
    }

    /// Another store on the same ledger, signing with `seed`.
    pub async fn writer(&self, seed: [u8; 32], adapter: AdapterConfig) -> LedgerStore<MemoryLedger> {
        LedgerStore::connect(
            Arc::clone(&self.ledger),
            Arc::new(Keypair::from_seed(&seed)),
            adapter,
        )
        .await
        .expect("second writer connects")
    }

    /// Seal the pending transactions into a block.
    pub fn seal(&self) {
        self.ledger.seal_block().expect("ledger is open");
    }
}

/// Route `tracing` output to the test harness. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
