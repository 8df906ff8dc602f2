mod common;

use common::{default_entitlements, digest_of, license_json, machine_a, machine_b, sign_hmac};
use featuregate_license::{
    document_payload, to_canonical_json, to_canonical_payload, LicenseRecord, TaggedSignature,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn record_from(doc: &Value) -> LicenseRecord {
    LicenseRecord::from_slice(&serde_json::to_vec(doc).unwrap()).unwrap()
}

// ── Payload ──────────────────────────────────────────────────────

#[test]
fn payload_excludes_signature() {
    let digest = digest_of(&machine_a());
    let record = record_from(&license_json(&[&digest], default_entitlements()));
    let payload = String::from_utf8(to_canonical_payload(&record).unwrap()).unwrap();
    assert!(!payload.contains("signature"));
    assert!(payload.starts_with(r#"{"allowed_fingerprints":["hex:"#));
}

#[test]
fn payload_exact_bytes() {
    let digest = digest_of(&machine_a());
    let record = record_from(&license_json(&[&digest], json!({"b": true, "a": false})));
    let payload = String::from_utf8(to_canonical_payload(&record).unwrap()).unwrap();
    let expected = format!(
        concat!(
            r#"{{"allowed_fingerprints":["{}"],"customer":"ACME GmbH","#,
            r#""entitlements":{{"a":false,"b":true}},"issued_at":"2026-01-01","#,
            r#""license_id":"LIC-2026-0042","schema":"featuregate-license-v1","#,
            r#""valid_until":"2026-12-31"}}"#
        ),
        digest
    );
    assert_eq!(payload, expected);
}

#[test]
fn payload_ignores_signature_value() {
    let digest = digest_of(&machine_a());
    let record = record_from(&license_json(&[&digest], default_entitlements()));
    let resigned = record.with_signature(TaggedSignature::new("ed25519", "b64:Zm9v"));
    assert_eq!(
        to_canonical_payload(&record).unwrap(),
        to_canonical_payload(&resigned).unwrap()
    );
}

#[test]
fn payload_independent_of_source_key_order() {
    let digest = digest_of(&machine_a());
    let doc = license_json(&[&digest], default_entitlements());
    let raw = format!(
        r#"{{
            "signature": "b64:AAAA",
            "valid_until": "2026-12-31",
            "entitlements": {{ "export_pdf": false, "reporting": true }},
            "customer": "ACME GmbH",
            "allowed_fingerprints": ["{digest}"],
            "license_id": "LIC-2026-0042",
            "issued_at": "2026-01-01",
            "schema": "featuregate-license-v1"
        }}"#
    );
    let reordered = LicenseRecord::from_slice(raw.as_bytes()).unwrap();
    assert_eq!(
        to_canonical_payload(&record_from(&doc)).unwrap(),
        to_canonical_payload(&reordered).unwrap()
    );
}

#[test]
fn signed_artifact_reparses_to_same_payload() {
    let digest = digest_of(&machine_a());
    let doc = license_json(&[&digest], default_entitlements());
    let artifact = sign_hmac(&doc);
    let reparsed = LicenseRecord::from_slice(&artifact).unwrap();
    assert_eq!(
        to_canonical_payload(&reparsed).unwrap(),
        to_canonical_payload(&record_from(&doc)).unwrap()
    );
}

#[test]
fn record_payload_matches_issued_document() {
    let digest_a = digest_of(&machine_a());
    let digest_b = digest_of(&machine_b());
    let mut doc = license_json(&[&digest_b, &digest_a, &digest_b], default_entitlements());
    doc["issued_at"] = json!("2026-1-5");
    doc["valid_until"] = json!("2026-12-31T23:59:59.000+02:00");

    let payload = to_canonical_payload(&record_from(&doc)).unwrap();
    assert_eq!(payload, document_payload(&doc));

    let text = String::from_utf8(payload).unwrap();
    assert!(text.contains(&format!(r#"["{digest_b}","{digest_a}","{digest_b}"]"#)));
    assert!(text.contains(r#""issued_at":"2026-1-5""#));
    assert!(text.contains(r#""valid_until":"2026-12-31T23:59:59.000+02:00""#));
}

// ── Generic values ───────────────────────────────────────────────

#[test]
fn non_ascii_emitted_raw() {
    let out = to_canonical_json(&json!({"customer": "Café Ünïcode 日本"}));
    assert_eq!(
        String::from_utf8(out).unwrap(),
        r#"{"customer":"Café Ünïcode 日本"}"#
    );
}

#[test]
fn keys_sorted_by_bytes_not_locale() {
    let out = to_canonical_json(&json!({"b": 1, "B": 2, "a": 3, "_": 4}));
    assert_eq!(String::from_utf8(out).unwrap(), r#"{"B":2,"_":4,"a":3,"b":1}"#);
}

#[test]
fn arrays_keep_order() {
    let out = to_canonical_json(&json!(["z", "a", 3, 1]));
    assert_eq!(String::from_utf8(out).unwrap(), r#"["z","a",3,1]"#);
}

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 _\\-\"\\\\é]{0,12}".prop_map(Value::String),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,6}", inner, 0..5)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn canonical_is_independent_of_insertion_order(
        entries in prop::collection::btree_map("[a-z_]{1,8}", json_leaf(), 0..8)
    ) {
        let forward: Map<String, Value> = entries.clone().into_iter().collect();
        let backward: Map<String, Value> = entries.into_iter().rev().collect();
        prop_assert_eq!(
            to_canonical_json(&Value::Object(forward)),
            to_canonical_json(&Value::Object(backward))
        );
    }

    #[test]
    fn canonical_parses_back_to_same_value(value in json_value()) {
        let bytes = to_canonical_json(&value);
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn canonical_is_idempotent(value in json_value()) {
        let once = to_canonical_json(&value);
        let parsed: Value = serde_json::from_slice(&once).unwrap();
        prop_assert_eq!(to_canonical_json(&parsed), once);
    }
}
