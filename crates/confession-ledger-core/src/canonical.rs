//! Canonical CBOR encoding for deterministic hashing.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Three encodings are defined, each feeding a different hash:
//! - submission content (Blake3, the submission id)
//! - Merkle leaf (Keccak-256, the leaf hash)
//! - block body (Keccak-256, the block integrity hash)
//!
//! Changing any of them changes every id, root and block hash on record.

use ciborium::value::Value;

use crate::crypto::{Identity, KeccakHash, RecoverableSignature};
use crate::submission::Submission;
use crate::types::SubmissionId;

/// Field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub mod content {
        pub const AUTHOR: u64 = 0;
        pub const CONTENT: u64 = 1;
        pub const SIGNATURE: u64 = 2;
        pub const CATEGORY: u64 = 3;
        pub const CREATED_AT: u64 = 4;
    }

    pub mod leaf {
        pub const ID: u64 = 0;
        pub const AUTHOR: u64 = 1;
        pub const CONTENT: u64 = 2;
        pub const SIGNATURE: u64 = 3;
        pub const CREATED_AT: u64 = 4;
    }

    pub mod block {
        pub const NUMBER: u64 = 0;
        pub const PREV_HASH: u64 = 1;
        pub const SUBMISSIONS: u64 = 2;
        pub const COMMITTED_AT: u64 = 3;
    }
}

/// Encode the signed content of a submission (the input to its id).
pub fn submission_content_bytes(
    author: &Identity,
    content: &str,
    signature: &RecoverableSignature,
    category: Option<&str>,
    created_at: i64,
) -> Vec<u8> {
    use keys::content::*;

    let entries = vec![
        (int(AUTHOR), Value::Bytes(author.0.to_vec())),
        (int(CONTENT), Value::Text(content.to_string())),
        (int(SIGNATURE), Value::Bytes(signature.0.to_vec())),
        (int(CATEGORY), optional_text(category)),
        (int(CREATED_AT), Value::Integer(created_at.into())),
    ];

    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Encode a submission as a Merkle leaf.
///
/// Covers `{id, author, content, signature, created_at}`. The category is
/// already bound through the id.
pub fn leaf_bytes(submission: &Submission) -> Vec<u8> {
    use keys::leaf::*;

    let entries = vec![
        (int(ID), Value::Bytes(submission.id.0.to_vec())),
        (int(AUTHOR), Value::Bytes(submission.author.0.to_vec())),
        (int(CONTENT), Value::Text(submission.content.clone())),
        (int(SIGNATURE), Value::Bytes(submission.signature.0.to_vec())),
        (int(CREATED_AT), Value::Integer(submission.created_at.into())),
    ];

    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Encode a block body for its integrity hash.
///
/// The Merkle root is deliberately not an input.
pub fn block_body_bytes(
    number: u64,
    prev_hash: &KeccakHash,
    submissions: &[Submission],
    committed_at: i64,
) -> Vec<u8> {
    use keys::block::*;

    let rows: Vec<Value> = submissions.iter().map(submission_row).collect();

    let entries = vec![
        (int(NUMBER), Value::Integer(number.into())),
        (int(PREV_HASH), Value::Bytes(prev_hash.0.to_vec())),
        (int(SUBMISSIONS), Value::Array(rows)),
        (int(COMMITTED_AT), Value::Integer(committed_at.into())),
    ];

    encode_cbor_value_canonical(&Value::Map(entries))
}

/// One submission inside a block body: a positional array.
fn submission_row(s: &Submission) -> Value {
    Value::Array(vec![
        id_value(&s.id),
        Value::Bytes(s.author.0.to_vec()),
        Value::Text(s.content.clone()),
        Value::Bytes(s.signature.0.to_vec()),
        optional_text(s.category.as_deref()),
        Value::Integer(s.created_at.into()),
    ])
}

fn id_value(id: &SubmissionId) -> Value {
    Value::Bytes(id.0.to_vec())
}

fn int(key: u64) -> Value {
    Value::Integer(key.into())
}

fn optional_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Null => buf.push(0xf6),
        // The three encodings above only build the variants listed.
        other => unreachable!("no canonical form for {other:?}"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
