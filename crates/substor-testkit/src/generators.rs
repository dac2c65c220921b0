//! Proptest generators for property-based testing.

use proptest::prelude::*;

use substor_core::MetaCall;

/// Generate a namespace, empty included.
pub fn namespace() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=32)
}

/// Generate a record key, empty included.
pub fn key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=48)
}

/// Generate metadata bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate up to `max` distinct keys, sorted.
pub fn distinct_keys(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(key(), 0..=max).prop_map(|keys| keys.into_iter().collect())
}

/// Generate one of the three metadata calls.
pub fn meta_call() -> impl Strategy<Value = MetaCall> {
    (0u8..3, namespace(), key(), payload(256)).prop_map(|(kind, namespace, key, metadata)| {
        match kind {
            0 => MetaCall::Set {
                namespace,
                key,
                metadata,
            },
            1 => MetaCall::Delete { namespace, key },
            _ => MetaCall::Update {
                namespace,
                key,
                metadata,
            },
        }
    })
}

/// Parameters for one stored record.
#[derive(Debug, Clone)]
pub struct MetadataParams {
    pub namespace: Vec<u8>,
    pub key: Vec<u8>,
    pub metadata: Vec<u8>,
}

impl Arbitrary for MetadataParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (namespace(), key(), payload(256))
            .prop_map(|(namespace, key, metadata)| MetadataParams {
                namespace,
                key,
                metadata,
            })
            .boxed()
    }
}

/// A store operation against a small key space, for model-based tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Set { key: u8, metadata: Vec<u8> },
    Delete { key: u8 },
    Append { key: u8, suffix: Vec<u8> },
}

impl StoreOp {
    pub fn key(&self) -> u8 {
        match self {
            StoreOp::Set { key, .. } | StoreOp::Delete { key } | StoreOp::Append { key, .. } => {
                *key
            }
        }
    }
}

impl Arbitrary for StoreOp {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        // Four keys keep collisions frequent.
        prop_oneof![
            (0u8..4, payload(16)).prop_map(|(key, metadata)| StoreOp::Set { key, metadata }),
            (0u8..4).prop_map(|key| StoreOp::Delete { key }),
            (0u8..4, payload(8)).prop_map(|(key, suffix)| StoreOp::Append { key, suffix }),
        ]
        .boxed()
    }
}
