//! Canonical JSON encoding of the signed license payload.
//!
//! Rules:
//! - object keys sorted by byte order at every level
//! - no whitespace between tokens
//! - strings escape only `"`, `\` and control characters; everything else is
//!   emitted as raw UTF-8
//! - numbers use serde_json's shortest round-trip form
//! - the top-level `signature` field is dropped
//!
//! Arrays keep their order and string values are never rewritten. An issuer
//! signing [`document_payload`] of its JSON document and a verifier computing
//! [`to_canonical_payload`] of the parsed record get the same bytes.

use crate::error::LicenseResult;
use crate::record::{LicenseRecord, SIGNATURE_FIELD};
use serde_json::{Map, Value};

/// Encodes the record with its signature removed.
///
/// # Errors
///
/// Returns [`crate::LicenseError::Serialization`] if the record cannot be
/// represented as JSON.
pub fn to_canonical_payload(record: &LicenseRecord) -> LicenseResult<Vec<u8>> {
    Ok(document_payload(&serde_json::to_value(record)?))
}

/// Encodes a license document as signed: canonical JSON without the
/// top-level `signature` field.
#[must_use]
pub fn document_payload(document: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    match document {
        Value::Object(map) => write_object(map, Some(SIGNATURE_FIELD), &mut out),
        other => write_value(other, &mut out),
    }
    out
}

/// Encodes any JSON value canonically.
#[must_use]
pub fn to_canonical_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(map, None, out),
    }
}

fn write_object(map: &Map<String, Value>, skip: Option<&str>, out: &mut Vec<u8>) {
    let mut entries: Vec<(&String, &Value)> = map
        .iter()
        .filter(|(key, _)| Some(key.as_str()) != skip)
        .collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    out.push(b'{');
    for (i, (key, item)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_string(key, out);
        out.push(b':');
        write_value(item, out);
    }
    out.push(b'}');
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}
