//! Golden storage-address vectors.
//!
//! Each vector pins the exact bytes a `(namespace, key)` pair maps to under
//! the default module layout (`TemplateModule` / `MetaStor`). A node running
//! the metadata module serves the record at exactly this address, so a
//! mismatch here means reads and writes land in different places.

use serde::Serialize;

use substor_core::{AccountId, StorageKeyCodec};

/// What a vector derives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    /// `derive_address(namespace, key)`.
    Record,
    /// `namespace_prefix(namespace)`; `key` is ignored.
    NamespacePrefix,
    /// `account_address(AccountId(key))`; `namespace` is ignored.
    Account,
}

/// A golden test vector.
#[derive(Debug, Clone, Serialize)]
pub struct AddressVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub kind: VectorKind,
    pub namespace: &'static [u8],
    pub key: &'static [u8],
    /// Expected address (hex, no prefix).
    pub expected: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<AddressVector> {
    vec![
        AddressVector {
            name: "short namespace and key",
            kind: VectorKind::Record,
            namespace: b"test",
            key: b"a",
            expected: "177e6857fb1d0e409376122fee3ad4f82696904a0f56d7d199a005f586ea8372\
                       c66a28419644149496ce3354be3a035d10746573740461",
        },
        AddressVector {
            name: "empty namespace and key",
            kind: VectorKind::Record,
            namespace: b"",
            key: b"",
            expected: "177e6857fb1d0e409376122fee3ad4f82696904a0f56d7d199a005f586ea8372\
                       7025e075d5e2f6cde3cc051a31f076600000",
        },
        AddressVector {
            name: "bucket object",
            kind: VectorKind::Record,
            namespace: b"bucket",
            key: b"object-1",
            expected: "177e6857fb1d0e409376122fee3ad4f82696904a0f56d7d199a005f586ea8372\
                       3dd4b069680b01439280aa6641a09b38186275636b6574206f626a6563742d31",
        },
        AddressVector {
            name: "namespace prefix",
            kind: VectorKind::NamespacePrefix,
            namespace: b"test",
            key: b"",
            expected: "177e6857fb1d0e409376122fee3ad4f82696904a0f56d7d199a005f586ea8372\
                       c66a28419644149496ce3354be3a035d1074657374",
        },
        AddressVector {
            name: "system account",
            kind: VectorKind::Account,
            namespace: b"",
            key: &[0x01; 32],
            expected: "26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9\
                       c035f853fcd0f0589e30c9e2dc1a0f57\
                       0101010101010101010101010101010101010101010101010101010101010101",
        },
    ]
}

/// Derive the address a vector describes, hex encoded.
pub fn derive_vector(vector: &AddressVector) -> Result<String, String> {
    let codec = StorageKeyCodec::default();
    let address = match vector.kind {
        VectorKind::Record => codec
            .derive_address(vector.namespace, vector.key)
            .map_err(|e| e.to_string())?,
        VectorKind::NamespacePrefix => codec
            .namespace_prefix(vector.namespace)
            .map_err(|e| e.to_string())?,
        VectorKind::Account => {
            let bytes: [u8; 32] = vector
                .key
                .try_into()
                .map_err(|_| format!("account key must be 32 bytes, got {}", vector.key.len()))?;
            codec.account_address(&AccountId(bytes))
        }
    };
    Ok(address.to_hex())
}

/// Verify all golden vectors: `(name, matches, derived hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| match derive_vector(v) {
            Ok(hex) => (v.name.to_string(), hex == v.expected, hex),
            Err(e) => (v.name.to_string(), false, e),
        })
        .collect()
}

/// All vectors as pretty JSON, for sharing with other implementations.
pub fn vectors_json() -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Rendered {
        name: &'static str,
        kind: VectorKind,
        namespace: String,
        key: String,
        expected: &'static str,
    }

    let rendered: Vec<Rendered> = all_vectors()
        .into_iter()
        .map(|v| Rendered {
            name: v.name,
            kind: v.kind,
            namespace: hex::encode(v.namespace),
            key: hex::encode(v.key),
            expected: v.expected,
        })
        .collect();
    serde_json::to_string_pretty(&rendered)
}
