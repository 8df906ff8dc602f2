//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use featuregate_license::{
    document_payload, FingerprintDigest, FingerprintProvider, HmacSha256Verifier,
    LicenseError, LicenseRecord, LicenseRepository, LicenseResult, LicensingService,
    StaticFingerprintProvider, TaggedSignature, VerificationSecret, ED25519, SIGNATURE_FIELD,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fixed HMAC secret shared by issuer and verifier in tests.
pub const TEST_SECRET: &[u8] = b"featuregate-test-secret-0123456789";

pub fn hmac_verifier() -> HmacSha256Verifier {
    HmacSha256Verifier::new(VerificationSecret::from_bytes(TEST_SECRET).unwrap())
}

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, [u8; 32]) {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key.to_bytes())
}

// ── Machines ────────────────────────────────────────────────────

pub fn machine_a() -> StaticFingerprintProvider {
    StaticFingerprintProvider::new(
        Some("5f0c2d1e-8a7b-4c3d-9e2f-112233445566"),
        Some("4C4C4544-0042-3510-8052-B4C04F4A3332"),
        Some("CN7016343E00YM"),
    )
}

pub fn machine_b() -> StaticFingerprintProvider {
    StaticFingerprintProvider::new(
        Some("0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9"),
        Some("9B2E6A40-1C3F-11EE-8C90-0242AC120002"),
        None,
    )
}

pub fn digest_of(provider: &StaticFingerprintProvider) -> FingerprintDigest {
    provider.collect().digest().clone()
}

// ── Clocks ──────────────────────────────────────────────────────

/// Well inside the default validity window.
pub fn mid_2026() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

/// After the default `valid_until`.
pub fn early_2027() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 1, 2, 0, 0, 0).unwrap()
}

// ── License documents ───────────────────────────────────────────

/// Unsigned license document with a placeholder signature.
pub fn license_json(allowed: &[&FingerprintDigest], entitlements: Value) -> Value {
    json!({
        "schema": "featuregate-license-v1",
        "license_id": "LIC-2026-0042",
        "customer": "ACME GmbH",
        "issued_at": "2026-01-01",
        "valid_until": "2026-12-31",
        "allowed_fingerprints": allowed.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
        "entitlements": entitlements,
        "signature": "b64:AAAA",
    })
}

/// Default entitlements: `reporting` on, `export_pdf` off.
pub fn default_entitlements() -> Value {
    json!({ "reporting": true, "export_pdf": false })
}

/// Replaces the signature of `doc` and returns the artifact bytes. The rest
/// of the document is written as given.
fn attach(doc: &Value, signature: &TaggedSignature) -> Vec<u8> {
    let mut doc = doc.clone();
    doc[SIGNATURE_FIELD] = serde_json::to_value(signature).unwrap();
    serde_json::to_vec_pretty(&doc).unwrap()
}

/// Signs the document as an issuer would, with [`TEST_SECRET`].
pub fn sign_hmac(doc: &Value) -> Vec<u8> {
    let signature = hmac_verifier().sign(&document_payload(doc)).unwrap();
    attach(doc, &signature)
}

/// Signs the document as an issuer would, with `signing_key`.
pub fn sign_ed25519(signing_key: &SigningKey, doc: &Value) -> Vec<u8> {
    let signature = signing_key.sign(&document_payload(doc));
    attach(doc, &TaggedSignature::from_bytes(ED25519, &signature.to_bytes()))
}

/// Writes `bytes` to `<dir>/license.lic` and returns the path.
pub fn write_license(dir: &Path, bytes: &[u8]) -> PathBuf {
    let path = dir.join("license.lic");
    std::fs::write(&path, bytes).unwrap();
    path
}

// ── In-memory repository ────────────────────────────────────────

/// Repository whose contents can be swapped after it is handed to a service.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
    loads: Arc<AtomicUsize>,
}

impl MemoryRepository {
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        let repo = Self::default();
        repo.set(Some(bytes));
        repo
    }

    pub fn set(&self, bytes: Option<Vec<u8>>) {
        *self.bytes.lock().unwrap() = bytes;
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl LicenseRepository for MemoryRepository {
    fn load(&self) -> LicenseResult<LicenseRecord> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match self.bytes.lock().unwrap().as_deref() {
            Some(bytes) => LicenseRecord::from_slice(bytes),
            None => Err(LicenseError::NotFound(PathBuf::from("memory://license"))),
        }
    }
}

/// Service over `repo` on machine A with the HMAC verifier, clock at mid 2026.
pub fn service_on_machine_a(repo: &MemoryRepository) -> LicensingService {
    LicensingService::new(
        Box::new(repo.clone()),
        Box::new(machine_a()),
        Box::new(hmac_verifier()),
    )
    .with_clock(mid_2026)
}
