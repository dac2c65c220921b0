//! End-to-end behavior of the ledger-backed metadata store against the
//! in-memory ledger.

use std::sync::Arc;

use substor::core::{BlockHash, Keypair};
use substor::node::{
    DispatchError, InvalidTransaction, LedgerNode, MemoryLedger, MemoryLedgerConfig,
    MetadataEvent,
};
use substor::{
    AbsentAccountPolicy, AdapterConfig, ChainSession, Error, LedgerStore, MetadataStore,
    Operation, Step, SubmissionMode, Transform,
};
use substor_testkit::fixtures::{init_tracing, TestFixture, DEFAULT_SEED};

fn append(suffix: &'static [u8]) -> Transform<'static> {
    Box::new(move |mut current: Vec<u8>| -> substor::Result<Vec<u8>> {
        current.extend_from_slice(suffix);
        Ok(current)
    })
}

async fn collect_keys<S: MetadataStore>(store: &S, namespace: &[u8]) -> substor::Result<Vec<Vec<u8>>> {
    let mut keys = Vec::new();
    store
        .list_keys(namespace, &mut |key: &[u8]| keys.push(key.to_vec()))
        .await?;
    Ok(keys)
}

#[tokio::test]
async fn test_set_then_get() -> anyhow::Result<()> {
    init_tracing();
    let fixture = TestFixture::new().await;

    fixture.store.set(b"bucket", b"object-1", b"chunks:3").await?;
    assert_eq!(fixture.store.get(b"bucket", b"object-1").await?, b"chunks:3");
    Ok(())
}

#[tokio::test]
async fn test_set_replaces_existing_value() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;

    fixture.store.set(b"bucket", b"k", b"first").await?;
    fixture.store.set(b"bucket", b"k", b"second").await?;
    assert_eq!(fixture.store.get(b"bucket", b"k").await?, b"second");

    let events = fixture.ledger.events();
    assert!(matches!(events[0].event, MetadataEvent::Created { .. }));
    assert!(matches!(events[1].event, MetadataEvent::Updated { .. }));
    Ok(())
}

#[tokio::test]
async fn test_empty_namespace_and_key() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;

    fixture.store.set(b"", b"", b"").await?;
    assert_eq!(fixture.store.get(b"", b"").await?, b"");
    assert_eq!(collect_keys(&fixture.store, b"").await?, vec![Vec::<u8>::new()]);
    Ok(())
}

#[tokio::test]
async fn test_namespaces_are_disjoint() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;

    fixture.store.set(b"a", b"k", b"in a").await?;
    fixture.store.set(b"b", b"k", b"in b").await?;
    assert_eq!(fixture.store.get(b"a", b"k").await?, b"in a");
    assert_eq!(fixture.store.get(b"b", b"k").await?, b"in b");
    Ok(())
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let fixture = TestFixture::new().await;

    let err = fixture.store.get(b"bucket", b"nope").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.operation(), Some(Operation::Get));
    assert_eq!(err.step(), Some(Step::QueryState));
}

#[tokio::test]
async fn test_delete_removes_record() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;

    fixture.store.set(b"bucket", b"k", b"v").await?;
    fixture.store.delete(b"bucket", b"k").await?;
    assert!(fixture.store.get(b"bucket", b"k").await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_delete_clears_the_derived_address() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;
    let address = fixture.store.session()?.codec().derive_address(b"bucket", b"k")?;
    let other = fixture.store.session()?.codec().derive_address(b"bucket", b"k2")?;

    fixture.store.set(b"bucket", b"k", b"v").await?;
    fixture.store.set(b"bucket", b"k2", b"v").await?;
    assert!(fixture.ledger.storage(&address, None).await?.is_some());

    fixture.store.delete(b"bucket", b"k").await?;
    assert!(fixture.ledger.storage(&address, None).await?.is_none());
    assert!(fixture.ledger.storage(&other, None).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_double_delete_succeeds_in_pool_mode() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;

    fixture.store.set(b"bucket", b"k", b"v").await?;
    fixture.store.delete(b"bucket", b"k").await?;
    fixture.store.delete(b"bucket", b"k").await?;
    assert!(fixture.store.get(b"bucket", b"k").await.unwrap_err().is_not_found());

    // The second delete was included and failed at dispatch.
    let last = fixture.ledger.events().pop().unwrap();
    assert_eq!(
        last.event,
        MetadataEvent::ExtrinsicFailed(DispatchError::MetadataNotFound)
    );
    Ok(())
}

#[tokio::test]
async fn test_double_delete_succeeds_in_block_mode() -> anyhow::Result<()> {
    let fixture = TestFixture::in_block().await;

    fixture.store.set(b"bucket", b"k", b"v").await?;
    fixture.store.delete(b"bucket", b"k").await?;
    fixture.store.delete(b"bucket", b"k").await?;
    assert!(fixture.store.get(b"bucket", b"k").await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_list_keys_returns_exactly_namespace_keys() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;

    fixture.store.set(b"ns", b"k1", b"1").await?;
    fixture.store.set(b"ns", b"k2", b"2").await?;
    fixture.store.set(b"ns2", b"k3", b"3").await?;
    fixture.store.set(b"n", b"sk", b"4").await?;

    let mut keys = collect_keys(&fixture.store, b"ns").await?;
    keys.sort();
    assert_eq!(keys, vec![b"k1".to_vec(), b"k2".to_vec()]);
    Ok(())
}

#[tokio::test]
async fn test_list_keys_across_pages() -> anyhow::Result<()> {
    for page_size in [1, 2, 3] {
        let adapter = AdapterConfig {
            key_page_size: page_size,
            ..Default::default()
        };
        let fixture =
            TestFixture::build(DEFAULT_SEED, MemoryLedgerConfig::default(), adapter).await;

        for key in [b"k1", b"k2", b"k3", b"k4"] {
            fixture.store.set(b"ns", key, b"v").await?;
        }

        let keys = collect_keys(&fixture.store, b"ns").await?;
        assert_eq!(keys.len(), 4, "page size {}", page_size);
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "keys arrive in ledger order");
    }
    Ok(())
}

#[tokio::test]
async fn test_list_keys_empty_namespace() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;
    fixture.store.set(b"other", b"k", b"v").await?;

    assert!(collect_keys(&fixture.store, b"ns").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_applies_transform() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;

    fixture.store.set(b"bucket", b"k", b"base").await?;
    fixture.store.update(b"bucket", b"k", append(b"+1")).await?;
    fixture.store.update(b"bucket", b"k", append(b"+2")).await?;
    assert_eq!(fixture.store.get(b"bucket", b"k").await?, b"base+1+2");
    Ok(())
}

#[tokio::test]
async fn test_update_missing_is_not_found() {
    let fixture = TestFixture::new().await;

    let err = fixture
        .store
        .update(b"bucket", b"k", append(b"x"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.operation(), Some(Operation::Update));
    assert_eq!(fixture.ledger.account_nonce(&fixture.account_id()).get(), 0);
}

#[tokio::test]
async fn test_aborted_update_leaves_record() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;
    fixture.store.set(b"bucket", b"k", b"keep").await?;
    let nonce = fixture.ledger.account_nonce(&fixture.account_id());

    let abort: Transform<'static> = Box::new(|_current: Vec<u8>| -> substor::Result<Vec<u8>> {
        Err(Error::UpdateAborted("version mismatch".into()))
    });
    let err = fixture.store.update(b"bucket", b"k", abort).await.unwrap_err();

    assert!(matches!(err.root(), Error::UpdateAborted(_)));
    assert_eq!(err.step(), Some(Step::Transform));
    assert_eq!(fixture.store.get(b"bucket", b"k").await?, b"keep");
    assert_eq!(fixture.ledger.account_nonce(&fixture.account_id()), nonce);
    Ok(())
}

#[tokio::test]
async fn test_foreign_record_fails_dispatch_in_block_mode() -> anyhow::Result<()> {
    let fixture = TestFixture::in_block().await;
    fixture.store.set(b"bucket", b"k", b"mine").await?;

    let adapter = AdapterConfig {
        submission: SubmissionMode::InBlock,
        ..Default::default()
    };
    let other = fixture.writer([0x07; 32], adapter).await;

    let err = other.set(b"bucket", b"k", b"theirs").await.unwrap_err();
    match err.root() {
        Error::Dispatch { reason, .. } => assert_eq!(*reason, DispatchError::NoPermissions),
        other => panic!("expected dispatch error, got {:?}", other),
    }
    assert_eq!(err.step(), Some(Step::AwaitInclusion));

    let err = other.delete(b"bucket", b"k").await.unwrap_err();
    assert!(matches!(err.root(), Error::Dispatch { .. }));
    assert_eq!(fixture.store.get(b"bucket", b"k").await?, b"mine");
    Ok(())
}

#[tokio::test]
async fn test_foreign_record_accepted_in_pool_mode() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;
    fixture.store.set(b"bucket", b"k", b"mine").await?;

    let other = fixture.writer([0x07; 32], AdapterConfig::default()).await;
    other.set(b"bucket", b"k", b"theirs").await?;

    // Pool acceptance is all pool mode reports; the module refused the write.
    assert_eq!(fixture.store.get(b"bucket", b"k").await?, b"mine");
    Ok(())
}

#[tokio::test]
async fn test_reject_policy_requires_account_state() -> anyhow::Result<()> {
    let adapter = AdapterConfig {
        absent_account: AbsentAccountPolicy::Reject,
        ..Default::default()
    };
    let fixture = TestFixture::build(DEFAULT_SEED, MemoryLedgerConfig::default(), adapter).await;

    let err = fixture.store.set(b"bucket", b"k", b"v").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.step(), Some(Step::FetchNonce));

    fixture.ledger.fund_account(&fixture.account_id(), 1_000);
    fixture.store.set(b"bucket", b"k", b"v").await?;
    assert_eq!(fixture.store.get(b"bucket", b"k").await?, b"v");
    Ok(())
}

#[tokio::test]
async fn test_unfunded_account_is_rejected_for_payment() {
    let ledger = MemoryLedgerConfig {
        require_funded_accounts: true,
        ..Default::default()
    };
    let fixture = TestFixture::build(DEFAULT_SEED, ledger, AdapterConfig::default()).await;

    let err = fixture.store.set(b"bucket", b"k", b"v").await.unwrap_err();
    assert_eq!(err.rejection(), Some(InvalidTransaction::Payment));
    assert_eq!(err.step(), Some(Step::Submit));
}

#[tokio::test]
async fn test_wrong_genesis_is_bad_proof() -> anyhow::Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let schema = ledger.runtime_schema().await?;
    let version = ledger.runtime_version().await?;
    let config = AdapterConfig::default();
    let session = ChainSession::from_parts(schema, BlockHash([0xEE; 32]), version, &config.layout)?;

    let store = LedgerStore::with_session(
        Arc::clone(&ledger),
        Arc::new(Keypair::from_seed(&DEFAULT_SEED)),
        config,
        session,
    );

    let err = store.set(b"bucket", b"k", b"v").await.unwrap_err();
    assert!(matches!(err.root(), Error::Submission(_)));
    assert_eq!(err.rejection(), Some(InvalidTransaction::BadProof));
    assert!(ledger.storage_snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent() -> anyhow::Result<()> {
    let fixture = TestFixture::new().await;
    fixture.store.set(b"bucket", b"k", b"v").await?;

    fixture.store.close().await?;
    fixture.store.close().await?;

    let err = fixture.store.get(b"bucket", b"k").await.unwrap_err();
    assert!(err.is_closed());
    assert_eq!(err.step(), Some(Step::AcquireSession));

    assert!(fixture.store.set(b"bucket", b"k", b"v").await.unwrap_err().is_closed());
    assert!(fixture.store.delete(b"bucket", b"k").await.unwrap_err().is_closed());
    assert!(collect_keys(&fixture.store, b"bucket").await.unwrap_err().is_closed());
    assert!(fixture.ledger.seal_block().is_err());
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_fails_connect() {
    let ledger = Arc::new(MemoryLedger::new());
    let config = AdapterConfig {
        key_page_size: 0,
        ..Default::default()
    };

    let err = LedgerStore::connect(ledger, Arc::new(Keypair::generate()), config)
        .await
        .err()
        .unwrap();
    assert!(matches!(err.root(), Error::Config(_)));
    assert_eq!(err.operation(), Some(Operation::Connect));
}

#[tokio::test]
async fn test_config_from_json() -> anyhow::Result<()> {
    let config: AdapterConfig =
        serde_json::from_str(r#"{"submission": "in_block", "key_page_size": 2}"#)?;
    let fixture = TestFixture::build(DEFAULT_SEED, MemoryLedgerConfig::default(), config).await;

    fixture.store.set(b"ns", b"a", b"1").await?;
    fixture.store.set(b"ns", b"b", b"2").await?;
    fixture.store.set(b"ns", b"c", b"3").await?;
    assert_eq!(collect_keys(&fixture.store, b"ns").await?.len(), 3);
    Ok(())
}
