//! Extrinsics: the signed transactions that mutate metadata on the ledger.
//!
//! A call is composed, bound to a chain and an account position, signed and
//! encoded in the version-4 signed format:
//!
//! ```text
//! compact(len) ++ 0x84
//!   ++ MultiAddress::Id(0x00 ++ account)
//!   ++ MultiSignature::Ed25519(0x00 ++ signature)
//!   ++ era ++ compact(nonce) ++ compact(tip)
//!   ++ pallet_index ++ call_index ++ args
//! ```
//!
//! The signature covers `call ++ extra ++ additional`, where `additional` is
//! never transmitted: spec version, transaction version, genesis hash and the
//! era checkpoint. Payloads longer than 256 bytes are signed as their
//! `blake2_256` digest.

use parity_scale_codec::{Decode, Encode};
use std::fmt;

use crate::crypto::{blake2_256, AccountId, Ed25519Signature, TransactionSigner};
use crate::error::{CoreError, Result};
use crate::layout::ModuleLayout;
use crate::scale;
use crate::types::{AccountNonce, BlockHash, RuntimeVersion, TxHash};

/// The extrinsic format version produced and accepted.
pub const EXTRINSIC_VERSION: u8 = 4;

/// Set on the version byte of signed extrinsics.
const SIGNED_FLAG: u8 = 0b1000_0000;

/// `MultiAddress::Id` discriminant.
const MULTI_ADDRESS_ID: u8 = 0x00;

/// `MultiSignature::Ed25519` discriminant.
const MULTI_SIGNATURE_ED25519: u8 = 0x00;

/// Signing payloads above this size are hashed before signing.
const MAX_UNHASHED_PAYLOAD: usize = 256;

/// Position of a call in the runtime: pallet index and call index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallIndex {
    pub pallet: u8,
    pub call: u8,
}

/// The logical metadata operations that become ledger calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Set,
    Delete,
    Update,
}

impl CallKind {
    /// Short operation name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Set => "set",
            CallKind::Delete => "delete",
            CallKind::Update => "update",
        }
    }

    /// The runtime call name for this kind under `layout`.
    pub fn call_name(self, layout: &ModuleLayout) -> &str {
        match self {
            CallKind::Set => &layout.set_call,
            CallKind::Delete => &layout.delete_call,
            CallKind::Update => &layout.update_call,
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata module call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCall {
    /// `set_metadata(namespace, key, metadata)`: insert a new key.
    Set {
        namespace: Vec<u8>,
        key: Vec<u8>,
        metadata: Vec<u8>,
    },
    /// `delete_metadata(namespace, key)`: remove a key owned by the signer.
    Delete { namespace: Vec<u8>, key: Vec<u8> },
    /// `update_metadata(namespace, key, metadata)`: replace the value of a key owned by the signer.
    Update {
        namespace: Vec<u8>,
        key: Vec<u8>,
        metadata: Vec<u8>,
    },
}

impl MetaCall {
    /// The operation kind.
    pub fn kind(&self) -> CallKind {
        match self {
            MetaCall::Set { .. } => CallKind::Set,
            MetaCall::Delete { .. } => CallKind::Delete,
            MetaCall::Update { .. } => CallKind::Update,
        }
    }

    /// The namespace argument.
    pub fn namespace(&self) -> &[u8] {
        match self {
            MetaCall::Set { namespace, .. }
            | MetaCall::Delete { namespace, .. }
            | MetaCall::Update { namespace, .. } => namespace,
        }
    }

    /// The key argument.
    pub fn key(&self) -> &[u8] {
        match self {
            MetaCall::Set { key, .. } | MetaCall::Delete { key, .. } | MetaCall::Update { key, .. } => {
                key
            }
        }
    }

    /// SCALE-encode the call arguments in declaration order.
    pub fn encode_args(&self) -> Vec<u8> {
        match self {
            MetaCall::Set {
                namespace,
                key,
                metadata,
            }
            | MetaCall::Update {
                namespace,
                key,
                metadata,
            } => (namespace, key, metadata).encode(),
            MetaCall::Delete { namespace, key } => (namespace, key).encode(),
        }
    }

    /// Decode the arguments of a call of `kind`. The whole input must be consumed.
    pub fn decode_args(kind: CallKind, mut input: &[u8]) -> Result<Self> {
        let call = match kind {
            CallKind::Set | CallKind::Update => {
                let namespace = scale::decode_bytes(&mut input)?;
                let key = scale::decode_bytes(&mut input)?;
                let metadata = scale::decode_bytes(&mut input)?;
                if kind == CallKind::Set {
                    MetaCall::Set {
                        namespace,
                        key,
                        metadata,
                    }
                } else {
                    MetaCall::Update {
                        namespace,
                        key,
                        metadata,
                    }
                }
            }
            CallKind::Delete => {
                let namespace = scale::decode_bytes(&mut input)?;
                let key = scale::decode_bytes(&mut input)?;
                MetaCall::Delete { namespace, key }
            }
        };

        if !input.is_empty() {
            return Err(CoreError::Decoding(format!(
                "{} trailing bytes after {} call arguments",
                input.len(),
                kind
            )));
        }
        Ok(call)
    }

    /// Prefix the arguments with the call index.
    pub fn encode_with(&self, index: CallIndex) -> EncodedCall {
        let mut buf = vec![index.pallet, index.call];
        buf.extend_from_slice(&self.encode_args());
        EncodedCall(buf)
    }
}

/// A call as it appears on the wire: `pallet ++ call ++ args`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedCall(pub Vec<u8>);

impl EncodedCall {
    /// The call index, if the call has one.
    pub fn index(&self) -> Option<CallIndex> {
        match self.0.as_slice() {
            [pallet, call, ..] => Some(CallIndex {
                pallet: *pallet,
                call: *call,
            }),
            _ => None,
        }
    }

    /// The encoded arguments.
    pub fn args(&self) -> &[u8] {
        self.0.get(2..).unwrap_or_default()
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncodedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedCall({:?}, {} arg bytes)", self.index(), self.args().len())
    }
}

/// Transaction mortality.
///
/// Only the immortal era is produced: a transaction stays valid until it is
/// included or its nonce is consumed by another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum Era {
    #[default]
    #[codec(index = 0)]
    Immortal,
}

/// The signed extensions that travel with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct SignedExtra {
    pub era: Era,
    #[codec(compact)]
    pub nonce: u32,
    #[codec(compact)]
    pub tip: u128,
}

/// The signed extensions that are signed but not transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode)]
pub struct AdditionalSigned {
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: BlockHash,
    /// The block the era is anchored to; genesis for immortal transactions.
    pub checkpoint: BlockHash,
}

/// The chain binding a signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningContext {
    pub genesis_hash: BlockHash,
    pub runtime_version: RuntimeVersion,
}

impl SigningContext {
    /// Additional signed data for an immortal transaction.
    pub fn additional(&self) -> AdditionalSigned {
        AdditionalSigned {
            spec_version: self.runtime_version.spec_version,
            transaction_version: self.runtime_version.transaction_version,
            genesis_hash: self.genesis_hash,
            checkpoint: self.genesis_hash,
        }
    }
}

/// Construct the bytes the signer signs.
pub fn signing_payload(
    call: &EncodedCall,
    extra: &SignedExtra,
    additional: &AdditionalSigned,
) -> Vec<u8> {
    let mut payload = call.0.clone();
    extra.encode_to(&mut payload);
    additional.encode_to(&mut payload);

    if payload.len() > MAX_UNHASHED_PAYLOAD {
        blake2_256(&payload).to_vec()
    } else {
        payload
    }
}

/// A call that has been resolved against the runtime but not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExtrinsic {
    call: MetaCall,
    encoded: EncodedCall,
}

impl PendingExtrinsic {
    /// Resolve `call` at `index`.
    pub fn new(call: MetaCall, index: CallIndex) -> Self {
        let encoded = call.encode_with(index);
        Self { call, encoded }
    }

    /// The logical call.
    pub fn call(&self) -> &MetaCall {
        &self.call
    }

    /// The encoded call.
    pub fn encoded_call(&self) -> &EncodedCall {
        &self.encoded
    }

    /// Bind to the chain and nonce, then sign.
    ///
    /// The tip is always zero.
    pub fn sign(
        self,
        signer: &dyn TransactionSigner,
        context: &SigningContext,
        nonce: AccountNonce,
    ) -> Result<SignedExtrinsic> {
        let extra = SignedExtra {
            era: Era::Immortal,
            nonce: nonce.get(),
            tip: 0,
        };
        let payload = signing_payload(&self.encoded, &extra, &context.additional());
        let signature = signer.sign_payload(&payload)?;

        Ok(SignedExtrinsic {
            signer: signer.account_id(),
            signature,
            extra,
            call: self.encoded,
        })
    }
}

/// A signed, submittable transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedExtrinsic {
    pub signer: AccountId,
    pub signature: Ed25519Signature,
    pub extra: SignedExtra,
    pub call: EncodedCall,
}

impl SignedExtrinsic {
    /// The nonce this transaction consumes.
    pub fn nonce(&self) -> AccountNonce {
        AccountNonce(self.extra.nonce)
    }

    /// Encode to the length-prefixed wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(2 + 32 + 1 + 64 + 8 + self.call.0.len());
        body.push(SIGNED_FLAG | EXTRINSIC_VERSION);
        body.push(MULTI_ADDRESS_ID);
        self.signer.encode_to(&mut body);
        body.push(MULTI_SIGNATURE_ED25519);
        self.signature.encode_to(&mut body);
        self.extra.encode_to(&mut body);
        body.extend_from_slice(&self.call.0);

        let mut out = Vec::with_capacity(body.len() + 4);
        scale::encode_compact(&mut out, body.len() as u64);
        out.extend_from_slice(&body);
        out
    }

    /// Decode from the wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let len = scale::decode_compact_u32(&mut input)? as usize;
        if input.len() != len {
            return Err(CoreError::Decoding(format!(
                "length prefix says {} bytes, found {}",
                len,
                input.len()
            )));
        }

        let version = u8::decode(&mut input)?;
        if version != SIGNED_FLAG | EXTRINSIC_VERSION {
            return Err(CoreError::UnsupportedExtrinsic(format!(
                "version byte {:#04x}",
                version
            )));
        }

        if u8::decode(&mut input)? != MULTI_ADDRESS_ID {
            return Err(CoreError::UnsupportedExtrinsic("address is not an account id".into()));
        }
        let signer = AccountId::decode(&mut input)?;

        if u8::decode(&mut input)? != MULTI_SIGNATURE_ED25519 {
            return Err(CoreError::UnsupportedExtrinsic("signature is not ed25519".into()));
        }
        let signature = Ed25519Signature::decode(&mut input)?;
        let extra = SignedExtra::decode(&mut input)?;

        if input.len() < 2 {
            return Err(CoreError::Decoding("missing call index".into()));
        }

        Ok(Self {
            signer,
            signature,
            extra,
            call: EncodedCall(input.to_vec()),
        })
    }

    /// `blake2_256` of the wire encoding.
    pub fn hash(&self) -> TxHash {
        TxHash(blake2_256(&self.encode()))
    }

    /// Check the signature against the chain binding in `context`.
    pub fn verify(&self, context: &SigningContext) -> Result<()> {
        let payload = signing_payload(&self.call, &self.extra, &context.additional());
        self.signer.verify(&payload, &self.signature)
    }
}
