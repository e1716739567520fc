//! Cryptographic primitives for the confession ledger.
//!
//! Wraps secp256k1 recoverable signing and Keccak-256 hashing with strong
//! types. Identities are Ethereum-style addresses so that any wallet able to
//! `personal_sign` can submit.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Prefix prepended to every signed message (EIP-191, version 0x45).
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// Length of an encoded recoverable signature: `r || s || v`.
pub const SIGNATURE_LENGTH: usize = 65;

/// A 32-byte Keccak-256 hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeccakHash(pub [u8; 32]);

impl KeccakHash {
    /// Compute the Keccak-256 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(Keccak256::digest(data).into())
    }

    /// Hash several slices as if concatenated.
    pub fn hash_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Keccak256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = decode_hex(s).map_err(|e| CoreError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidHash(format!("expected 32 bytes: {}", s)))?;
        Ok(Self(arr))
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for KeccakHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keccak({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for KeccakHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for KeccakHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for KeccakHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for KeccakHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for KeccakHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A 20-byte account address recovered from a signature.
///
/// There is no account system: the address is the whole identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(pub [u8; 20]);

impl Identity {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derive the address of a secp256k1 public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // Skip the 0x04 uncompressed-point tag.
        let hash = KeccakHash::hash(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash.0[12..]);
        Self(address)
    }

    /// The normalized textual form: lowercase, `0x`-prefixed.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse an address in any letter case, with or without `0x`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let bytes = decode_hex(s.trim()).map_err(|e| CoreError::InvalidIdentity(e.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidIdentity(format!("expected 20 bytes: {}", s)))?;
        Ok(Self(arr))
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_hex())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

/// A 65-byte recoverable ECDSA signature: `r (32) || s (32) || v (1)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoverableSignature(pub [u8; SIGNATURE_LENGTH]);

impl RecoverableSignature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// The `r || s` half.
    pub fn rs(&self) -> &[u8] {
        &self.0[..64]
    }

    /// The recovery byte as transmitted (0, 1, 27 or 28 when well-formed).
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes =
            decode_hex(s.trim()).map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
        let arr: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            CoreError::InvalidSignature(format!("expected 65 bytes, got {}", b.len()))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({}...)", &hex::encode(self.0)[..16])
    }
}

impl AsRef<[u8]> for RecoverableSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for RecoverableSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RecoverableSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Compute the digest a wallet signs for `personal_sign(message)`.
///
/// `keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)`
pub fn personal_message_hash(message: &[u8]) -> KeccakHash {
    let len = message.len().to_string();
    KeccakHash::hash_parts(&[PERSONAL_MESSAGE_PREFIX, len.as_bytes(), message])
}

/// Recover the signer of `message` from a recoverable signature.
///
/// Returns `None` for a bad recovery byte, out-of-range or high-S scalars,
/// or a failed recovery.
pub fn recover_identity(message: &[u8], signature: &RecoverableSignature) -> Option<Identity> {
    let recovery_byte = match signature.v() {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        _ => return None,
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)?;

    let sig = Signature::from_slice(signature.rs()).ok()?;
    if sig.normalize_s().is_some() {
        // High-S: malleable twin of a valid signature.
        return None;
    }

    let prehash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &sig, recovery_id).ok()?;
    Some(Identity::from_verifying_key(&key))
}

/// A secp256k1 keypair able to produce submissions.
///
/// The ledger itself never signs; this exists for clients and tests.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::random(&mut rng),
        }
    }

    /// Create from a 32-byte secret scalar.
    pub fn from_secret(secret: &[u8; 32]) -> Result<Self, CoreError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// The address this keypair signs as.
    pub fn identity(&self) -> Identity {
        Identity::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Sign `message` the way `personal_sign` does, with `v` in {27, 28}.
    pub fn sign(&self, message: &[u8]) -> Result<RecoverableSignature, CoreError> {
        let prehash = personal_message_hash(message);
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash.as_bytes())
            .map_err(|e| CoreError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(RecoverableSignature(out))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.identity())
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let stripped = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            KeccakHash::hash(b"").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hash_parts_matches_concatenation() {
        let joined = KeccakHash::hash(b"hello world");
        let parts = KeccakHash::hash_parts(&[b"hello", b" ", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_sign_recover() {
        let keypair = Keypair::generate();
        let message = b"i never returned the library book";
        let signature = keypair.sign(message).unwrap();

        assert_eq!(recover_identity(message, &signature), Some(keypair.identity()));

        // A different message recovers to somebody else (or nobody).
        let other = recover_identity(b"i returned the library book", &signature);
        assert_ne!(other, Some(keypair.identity()));
    }

    #[test]
    fn test_recover_accepts_raw_recovery_byte() {
        let keypair = Keypair::from_secret(&[0x11; 32]).unwrap();
        let mut signature = keypair.sign(b"v as 0/1").unwrap();
        signature.0[64] -= 27;
        assert_eq!(recover_identity(b"v as 0/1", &signature), Some(keypair.identity()));
    }

    #[test]
    fn test_recover_rejects_bad_recovery_byte() {
        let keypair = Keypair::from_secret(&[0x11; 32]).unwrap();
        let mut signature = keypair.sign(b"msg").unwrap();
        signature.0[64] = 5;
        assert_eq!(recover_identity(b"msg", &signature), None);
    }

    #[test]
    fn test_recover_rejects_zero_signature() {
        let signature = RecoverableSignature([0u8; SIGNATURE_LENGTH]);
        assert_eq!(recover_identity(b"msg", &signature), None);
    }

    #[test]
    fn test_deterministic_from_secret() {
        let kp1 = Keypair::from_secret(&[0x42; 32]).unwrap();
        let kp2 = Keypair::from_secret(&[0x42; 32]).unwrap();
        assert_eq!(kp1.identity(), kp2.identity());
        assert!(Keypair::from_secret(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_identity_parse_normalizes_case() {
        let upper = Identity::parse("0x2C7536E3605D9C16A7A3D7B1898E529396A65C23").unwrap();
        let lower = Identity::parse("2c7536e3605d9c16a7a3d7b1898e529396a65c23").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.to_hex(), "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23");
        assert!(Identity::parse("0x1234").is_err());
        assert!(Identity::parse("not hex").is_err());
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"roundtrip").unwrap();
        let parsed = RecoverableSignature::from_hex(&signature.to_hex()).unwrap();
        assert_eq!(signature, parsed);
        assert!(RecoverableSignature::from_hex("0xdeadbeef").is_err());
    }

    #[test]
    fn test_hash_serde_as_hex_string() {
        let hash = KeccakHash::hash(b"serde");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: KeccakHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
