//! Cryptographic primitives for Substor.
//!
//! Wraps Ed25519 signing and the ledger's storage hashers with strong types.
//! The hashers are the ones the runtime uses for storage keys and signing
//! payloads, so they must not be swapped for anything "equivalent".

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// `twox_128`: the fast non-cryptographic hasher used for pallet and item prefixes.
pub fn twox_128(data: &[u8]) -> [u8; 16] {
    sp_crypto_hashing::twox_128(data)
}

/// `blake2_128`: the cryptographic hasher behind `Blake2_128Concat` map keys.
pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    sp_crypto_hashing::blake2_128(data)
}

/// `blake2_256`: transaction hashes and oversized signing payloads.
pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    sp_crypto_hashing::blake2_256(data)
}

/// A 32-byte account identifier (the raw Ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;

        let sig = Signature::from_bytes(&signature.0);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &self.to_hex()[..16])
    }
}

impl From<[u8; 64]> for Ed25519Signature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

/// Anything that can sign transactions on behalf of one account.
///
/// Signing is fallible so that remote signers and hardware keys can report
/// failures instead of panicking.
pub trait TransactionSigner: Send + Sync {
    /// The account the signatures verify against.
    fn account_id(&self) -> AccountId;

    /// Sign a transaction signing payload.
    fn sign_payload(&self, payload: &[u8]) -> Result<Ed25519Signature, CoreError>;
}

/// An Ed25519 keypair for signing transactions.
///
/// This wraps ed25519-dalek's SigningKey.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Create from a hex-encoded 32-byte seed (`0x` prefix optional).
    pub fn from_seed_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| CoreError::Signing(format!("invalid seed hex: {}", e)))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::Signing(format!("seed must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_seed(&seed))
    }

    /// Get the account identifier.
    pub fn account_id(&self) -> AccountId {
        AccountId(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing_key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }
}

impl TransactionSigner for Keypair {
    fn account_id(&self) -> AccountId {
        Keypair::account_id(self)
    }

    fn sign_payload(&self, payload: &[u8]) -> Result<Ed25519Signature, CoreError> {
        Ok(self.sign(payload))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.account_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"set_metadata payload";
        let signature = keypair.sign(message);

        keypair
            .account_id()
            .verify(message, &signature)
            .expect("valid signature should verify");

        assert!(keypair.account_id().verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let kp1 = Keypair::from_seed(&[0x42; 32]);
        let kp2 = Keypair::from_seed_hex(&format!("0x{}", hex::encode([0x42u8; 32]))).unwrap();
        assert_eq!(kp1.account_id(), kp2.account_id());
    }

    #[test]
    fn test_seed_hex_wrong_length() {
        assert!(matches!(
            Keypair::from_seed_hex("0x0102"),
            Err(CoreError::Signing(_))
        ));
    }

    #[test]
    fn test_hasher_widths() {
        assert_eq!(twox_128(b"System").len(), 16);
        assert_eq!(blake2_128(b"").len(), 16);
        assert_eq!(blake2_256(b"").len(), 32);
    }

    #[test]
    fn test_twox_128_known_prefix() {
        // Well-known prefix of the System pallet.
        assert_eq!(hex::encode(twox_128(b"System")), "26aa394eea5630e07c48ae0c9558cef7");
    }

    #[test]
    fn test_account_id_scale_is_raw_bytes() {
        let account = AccountId::from_bytes([7u8; 32]);
        assert_eq!(account.encode(), vec![7u8; 32]);
    }
}
