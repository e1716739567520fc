//! Known-answer vectors for the signing scheme and hashes.
//!
//! The values come from the Ethereum ecosystem (`personal_sign`, address
//! derivation, Keccak-256), so a wallet that signs for this ledger can be
//! checked against the same table.

use confession_ledger_core::crypto::{personal_message_hash, recover_identity};
use confession_ledger_core::{Identity, KeccakHash, Keypair, RecoverableSignature};

/// A secret key and the address it must derive.
#[derive(Debug, Clone)]
pub struct AddressVector {
    pub name: &'static str,
    /// Secret scalar (hex).
    pub secret: &'static str,
    /// Expected address (lowercase hex).
    pub address: &'static str,
}

/// A `personal_sign` signature and the address it must recover to.
#[derive(Debug, Clone)]
pub struct SignatureVector {
    pub name: &'static str,
    pub message: &'static [u8],
    /// Expected `personal_sign` digest (hex).
    pub digest: &'static str,
    /// 65-byte `r || s || v` signature (hex).
    pub signature: &'static str,
    /// Expected recovered address (lowercase hex).
    pub address: &'static str,
}

/// A Keccak-256 input and digest.
#[derive(Debug, Clone)]
pub struct HashVector {
    pub name: &'static str,
    pub input: &'static [u8],
    pub digest: &'static str,
}

pub fn hash_vectors() -> Vec<HashVector> {
    vec![
        HashVector {
            name: "empty input",
            input: b"",
            digest: "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470",
        },
        HashVector {
            name: "abc",
            input: b"abc",
            digest: "0x4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45",
        },
    ]
}

pub fn address_vectors() -> Vec<AddressVector> {
    vec![AddressVector {
        name: "web3 accounts example key",
        secret: "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        address: "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23",
    }]
}

pub fn signature_vectors() -> Vec<SignatureVector> {
    vec![SignatureVector {
        name: "personal_sign of \"Some data\"",
        message: b"Some data",
        digest: "0x1da44b586eb0729ff70a73c326926f6ed5a25f5b056e7f47fbc6e58d86871655",
        signature: "0xb91467e570a6466aa9e9876cbcd013baba02900b8979d43fe208a4a4f339f5fd\
                    6007e74cd82e037b800186422fc2da167c747ef045e5d18a5f5d4300f8e1a0291c",
        address: "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23",
    }]
}

/// Check every vector against the implementation.
///
/// Returns `(name, matches, detail)` per vector; `detail` is what the
/// implementation produced.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    for v in hash_vectors() {
        let got = KeccakHash::hash(v.input).to_hex();
        results.push((v.name.to_string(), got == v.digest, got));
    }

    for v in address_vectors() {
        let got = decode_secret(v.secret)
            .and_then(|secret| Keypair::from_secret(&secret).ok())
            .map(|kp| kp.identity().to_hex())
            .unwrap_or_default();
        results.push((v.name.to_string(), got == v.address, got));
    }

    for v in signature_vectors() {
        let digest = personal_message_hash(v.message).to_hex();
        let recovered = RecoverableSignature::from_hex(v.signature)
            .ok()
            .and_then(|sig| recover_identity(v.message, &sig))
            .map(|id| id.to_hex())
            .unwrap_or_default();
        let ok = digest == v.digest && recovered == v.address;
        results.push((v.name.to_string(), ok, recovered));
    }

    results
}

/// Identity for the address vector key, for tests that need a fixed signer.
pub fn reference_identity() -> Identity {
    Identity::parse(address_vectors()[0].address).expect("vector address is valid")
}

fn decode_secret(s: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}
