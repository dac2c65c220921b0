//! Storage-key derivation for the metadata double map.
//!
//! The metadata module declares
//!
//! ```text
//! MetaStor: double_map hasher(blake2_128_concat) Vec<u8>, hasher(identity) Vec<u8>
//!           => (Vec<u8>, AccountId)
//! ```
//!
//! so a record for `(namespace, key)` lives at
//!
//! ```text
//! twox_128(pallet) ++ twox_128(item)
//!   ++ blake2_128(scale(namespace)) ++ scale(namespace)
//!   ++ scale(key)
//! ```
//!
//! Every component is SCALE length-prefixed, which makes the address an
//! injective function of `(namespace, key)`. The raw concatenation
//! `blake2_128(scale(namespace)) ++ key` is a different address: a write
//! under one layout is invisible to reads under the other, and the ledger
//! answers such reads with "not found". Only the layout above is derived here.

use parity_scale_codec::{Decode, Encode};

use crate::crypto::{blake2_128, twox_128, AccountId};
use crate::error::{CoreError, Result};
use crate::layout::ModuleLayout;
use crate::scale;
use crate::types::{AccountNonce, StorageAddress};

/// Largest byte sequence the SCALE length prefix can describe.
const MAX_COMPONENT_LEN: usize = u32::MAX as usize;

/// The value stored for each metadata key: the payload and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct StoredRecord {
    /// The opaque metadata payload.
    pub data: Vec<u8>,
    /// The account that created the record; only it may update or delete.
    pub owner: AccountId,
}

impl StoredRecord {
    /// Decode a raw storage value. The whole input must be consumed.
    pub fn decode_value(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let record = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(CoreError::Decoding(format!(
                "{} trailing bytes after stored record",
                input.len()
            )));
        }
        Ok(record)
    }
}

/// Derives storage addresses for metadata records and account state.
///
/// Pure and cheap to clone; the two 32-byte storage prefixes are computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeyCodec {
    metadata_prefix: [u8; 32],
    account_prefix: [u8; 32],
}

impl StorageKeyCodec {
    /// Build a codec for the given module layout.
    pub fn new(layout: &ModuleLayout) -> Self {
        Self {
            metadata_prefix: Self::storage_prefix(&layout.pallet, &layout.storage_item),
            account_prefix: Self::storage_prefix(&layout.system_pallet, &layout.account_item),
        }
    }

    /// `twox_128(pallet) ++ twox_128(item)`.
    pub fn storage_prefix(pallet: &str, item: &str) -> [u8; 32] {
        let mut prefix = [0u8; 32];
        prefix[..16].copy_from_slice(&twox_128(pallet.as_bytes()));
        prefix[16..].copy_from_slice(&twox_128(item.as_bytes()));
        prefix
    }

    /// The prefix shared by every record of `namespace`.
    pub fn namespace_prefix(&self, namespace: &[u8]) -> Result<StorageAddress> {
        check_len("namespace", namespace)?;
        let encoded_ns = scale::encode_bytes(namespace);

        let mut buf = Vec::with_capacity(32 + 16 + encoded_ns.len());
        buf.extend_from_slice(&self.metadata_prefix);
        // blake2_128_concat
        buf.extend_from_slice(&blake2_128(&encoded_ns));
        buf.extend_from_slice(&encoded_ns);
        Ok(StorageAddress(buf))
    }

    /// The full storage address of `(namespace, key)`.
    pub fn derive_address(&self, namespace: &[u8], key: &[u8]) -> Result<StorageAddress> {
        check_len("key", key)?;
        let mut address = self.namespace_prefix(namespace)?;
        // identity hasher over the encoded key
        scale::encode_bytes_to(&mut address.0, key);
        Ok(address)
    }

    /// Recover the logical key from an address found under `prefix`.
    pub fn recover_key(&self, prefix: &StorageAddress, address: &[u8]) -> Result<Vec<u8>> {
        let rest = address
            .strip_prefix(prefix.as_bytes())
            .ok_or_else(|| CoreError::PrefixMismatch {
                prefix: prefix.to_hex(),
                address: hex::encode(address),
            })?;
        scale::decode_bytes_exact(rest)
    }

    /// The `System.Account` address of `account` (`blake2_128_concat` hasher).
    pub fn account_address(&self, account: &AccountId) -> StorageAddress {
        let mut buf = Vec::with_capacity(32 + 16 + 32);
        buf.extend_from_slice(&self.account_prefix);
        buf.extend_from_slice(&blake2_128(account.as_bytes()));
        buf.extend_from_slice(account.as_bytes());
        StorageAddress(buf)
    }

    /// Read the nonce out of a raw `AccountInfo` value.
    ///
    /// The nonce is the leading `u32` field; the remaining fields (reference
    /// counters and balances) vary between runtimes and are not decoded.
    pub fn decode_account_nonce(bytes: &[u8]) -> Result<AccountNonce> {
        let mut input = bytes;
        let nonce = u32::decode(&mut input)?;
        Ok(AccountNonce(nonce))
    }
}

impl Default for StorageKeyCodec {
    fn default() -> Self {
        Self::new(&ModuleLayout::default())
    }
}

fn check_len(what: &str, bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_COMPONENT_LEN {
        return Err(CoreError::AddressDerivation(format!(
            "{} of {} bytes exceeds the SCALE length limit",
            what,
            bytes.len()
        )));
    }
    Ok(())
}
