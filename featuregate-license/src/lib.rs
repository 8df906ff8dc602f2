//! Offline license verification and feature gating.
//!
//! This crate handles:
//! - Reading a signed license artifact from a fixed location
//! - Signature verification over a canonical JSON payload
//! - Expiry checks against the system clock
//! - Hardware fingerprinting for machine binding
//! - Per-feature allow/deny decisions from the verified entitlements
//!
//! # Design Principles
//!
//! - **Fail closed**: entitlements only come from a `VALID` license
//! - **Fully offline**: no network calls, ever
//! - **Deterministic**: the same artifact and machine always give the same outcome
//! - **Explainable**: every denial carries a stable error code and a message
//!
//! # License Format
//!
//! A UTF-8 JSON document:
//!
//! ```json
//! {
//!   "schema": "featuregate-license-v1",
//!   "license_id": "LIC-2026-0042",
//!   "customer": "ACME GmbH",
//!   "issued_at": "2026-01-01",
//!   "valid_until": "2026-12-31",
//!   "allowed_fingerprints": ["hex:9f2c..."],
//!   "entitlements": { "reporting": true, "export_pdf": false },
//!   "signature": "b64:..."
//! }
//! ```
//!
//! The signature covers every field except `signature` itself, encoded as
//! canonical JSON (see [`to_canonical_payload`] and [`document_payload`]).

mod canonical;
mod config;
mod error;
mod fingerprint;
mod gatekeeper;
mod probe;
mod record;
mod rehost;
mod repository;
mod service;
mod signature;

pub use canonical::{document_payload, to_canonical_json, to_canonical_payload};
pub use config::{
    resolve_license_path, LicensingConfig, SignatureAlgorithm, SignatureConfig, UNIX_DATA_DIR,
};
pub use error::{ErrorCode, LicenseError, LicenseResult};
pub use fingerprint::{
    FingerprintDigest, FingerprintProvider, FingerprintSlot, MachineFingerprint,
    StaticFingerprintProvider, SystemFingerprintProvider, ABSENT_MARKER, DEFAULT_PROBE_TIMEOUT,
    DIGEST_PREFIX,
};
pub use gatekeeper::{
    is_valid_feature_code, FeatureDescriptor, FeatureGatekeeper, GateDecision, GateReason,
    GateReport, LicensingRequirement,
};
pub use record::{Entitlements, LicenseDate, LicenseRecord, LICENSE_SCHEMA_V1, SIGNATURE_FIELD};
pub use rehost::RehostRequest;
pub use repository::{FileLicenseRepository, LicenseRepository, MAX_LICENSE_BYTES};
pub use service::{FingerprintMismatch, LicenseStatus, LicensingService, VerificationResult};
pub use signature::{
    Ed25519Verifier, HmacSha256Verifier, SignatureVerifier, TaggedSignature, VerificationSecret,
    ED25519, HMAC_SHA256, MIN_SECRET_LEN,
};
