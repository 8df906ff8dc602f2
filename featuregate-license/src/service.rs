//! License verification pipeline and cached entitlement state.
//!
//! Every evaluation runs the same fixed sequence and stops at the first
//! failing step:
//!
//! 1. load the record (`MISSING`, `INVALID_FORMAT`)
//! 2. verify the signature over the canonical payload (`INVALID_SIGNATURE`)
//! 3. compare `valid_until` to now (`EXPIRED`)
//! 4. match the local fingerprint digest (`FINGERPRINT_MISMATCH`)
//! 5. `VALID`
//!
//! The outcome and its entitlements are swapped into the cache as one unit.

use crate::canonical::to_canonical_payload;
use crate::config::LicensingConfig;
use crate::error::{ErrorCode, LicenseResult};
use crate::fingerprint::{FingerprintDigest, FingerprintProvider};
use crate::record::{Entitlements, LicenseRecord};
use crate::rehost::RehostRequest;
use crate::repository::LicenseRepository;
use crate::signature::SignatureVerifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{info, warn};

/// Verification state of the license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    /// No evaluation has run yet.
    Unverified,
    /// All checks passed.
    Valid,
    /// No license artifact at the configured location.
    Missing,
    /// Artifact unreadable or structurally invalid.
    InvalidFormat,
    /// Signature did not verify.
    InvalidSignature,
    /// Validity window has ended.
    Expired,
    /// Local machine not in the allowed set.
    FingerprintMismatch,
}

impl LicenseStatus {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Taxonomy code for non-valid states.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Valid | Self::Unverified => None,
            Self::Missing => Some(ErrorCode::LicenseMissing),
            Self::InvalidFormat => Some(ErrorCode::LicenseInvalidFormat),
            Self::InvalidSignature => Some(ErrorCode::LicenseInvalidSignature),
            Self::Expired => Some(ErrorCode::LicenseExpired),
            Self::FingerprintMismatch => Some(ErrorCode::LicenseFingerprintMismatch),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "UNVERIFIED",
            Self::Valid => "VALID",
            Self::Missing => "MISSING",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Expired => "EXPIRED",
            Self::FingerprintMismatch => "FINGERPRINT_MISMATCH",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The allowed set and the local digest that failed to match it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintMismatch {
    pub allowed: Vec<FingerprintDigest>,
    pub local: FingerprintDigest,
}

/// Outcome of one evaluation.
///
/// Only a `VALID` result carries the record; nothing else exposes
/// entitlement data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    status: LicenseStatus,
    message: String,
    license_id: Option<String>,
    #[serde(skip)]
    record: Option<LicenseRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mismatch: Option<FingerprintMismatch>,
}

impl VerificationResult {
    fn failed(status: LicenseStatus, license_id: Option<&str>, message: String) -> Self {
        Self {
            status,
            message,
            license_id: license_id.map(String::from),
            record: None,
            mismatch: None,
        }
    }

    fn valid(record: LicenseRecord) -> Self {
        Self {
            status: LicenseStatus::Valid,
            message: "License is valid".to_string(),
            license_id: Some(record.license_id().to_string()),
            record: Some(record),
            mismatch: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> LicenseStatus {
        self.status
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.status.error_code()
    }

    /// Diagnostic for operators.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// License id, when the record got far enough to be parsed.
    #[must_use]
    pub fn license_id(&self) -> Option<&str> {
        self.license_id.as_deref()
    }

    /// The verified record; `None` unless `VALID`.
    #[must_use]
    pub fn record(&self) -> Option<&LicenseRecord> {
        self.record.as_ref()
    }

    /// Mismatch detail; `Some` only for `FINGERPRINT_MISMATCH`.
    #[must_use]
    pub fn mismatch(&self) -> Option<&FingerprintMismatch> {
        self.mismatch.as_ref()
    }

    /// Entitlements of a valid license, empty otherwise.
    #[must_use]
    pub fn entitlements(&self) -> Entitlements {
        match (&self.status, &self.record) {
            (LicenseStatus::Valid, Some(record)) => record.entitlements().clone(),
            _ => Entitlements::empty(),
        }
    }
}

/// Cached outcome; replaced whole, never mutated.
#[derive(Debug)]
struct Snapshot {
    result: VerificationResult,
    entitlements: Entitlements,
}

impl Snapshot {
    fn new(result: VerificationResult) -> Self {
        let entitlements = result.entitlements();
        Self {
            result,
            entitlements,
        }
    }
}

/// Orchestrates loading, verification and entitlement lookup.
///
/// Reads are served from a cached snapshot. The first read evaluates lazily;
/// after that only [`LicensingService::refresh`] re-runs the pipeline.
pub struct LicensingService {
    repository: Box<dyn LicenseRepository>,
    fingerprints: Box<dyn FingerprintProvider>,
    verifier: Box<dyn SignatureVerifier>,
    clock: fn() -> DateTime<Utc>,
    cache: RwLock<Option<Arc<Snapshot>>>,
    evaluation: Mutex<()>,
}

impl LicensingService {
    /// Creates a service in the `UNVERIFIED` state. Nothing is read until
    /// first use.
    #[must_use]
    pub fn new(
        repository: Box<dyn LicenseRepository>,
        fingerprints: Box<dyn FingerprintProvider>,
        verifier: Box<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            repository,
            fingerprints,
            verifier,
            clock: Utc::now,
            cache: RwLock::new(None),
            evaluation: Mutex::new(()),
        }
    }

    /// Composes the file repository, system fingerprint provider and the
    /// configured verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable verification key is configured.
    pub fn from_config(config: &LicensingConfig) -> LicenseResult<Self> {
        Ok(Self::new(
            Box::new(config.repository()),
            Box::new(config.fingerprint_provider()),
            config.verifier()?,
        ))
    }

    /// Replaces the time source used for the expiry check.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Status of the cached result without triggering an evaluation.
    #[must_use]
    pub fn cached_status(&self) -> LicenseStatus {
        self.cached()
            .map_or(LicenseStatus::Unverified, |s| s.result.status())
    }

    /// Returns the cached result, evaluating on first call.
    #[must_use]
    pub fn verification(&self) -> VerificationResult {
        self.snapshot().result.clone()
    }

    /// Entitlements of the cached result; empty unless `VALID`.
    #[must_use]
    pub fn entitlements(&self) -> Entitlements {
        self.snapshot().entitlements.clone()
    }

    /// Returns true only if the license is valid and entitles `feature_code`.
    #[must_use]
    pub fn is_feature_allowed(&self, feature_code: &str) -> bool {
        self.snapshot().entitlements.is_entitled(feature_code)
    }

    /// Re-runs the pipeline and replaces the cache.
    pub fn refresh(&self) -> VerificationResult {
        let _guard = self.evaluation.lock().unwrap_or_else(PoisonError::into_inner);
        info!("Refreshing license");
        let snapshot = self.store(self.evaluate());
        snapshot.result.clone()
    }

    /// Builds a rehost request if the cached status is `FINGERPRINT_MISMATCH`.
    #[must_use]
    pub fn rehost_request(&self, reason: impl Into<String>) -> Option<RehostRequest> {
        let snapshot = self.snapshot();
        let result = &snapshot.result;
        match (result.license_id(), result.mismatch()) {
            (Some(license_id), Some(mismatch)) => Some(RehostRequest::new(
                license_id,
                mismatch.allowed.clone(),
                mismatch.local.clone(),
                reason,
            )),
            _ => None,
        }
    }

    fn cached(&self) -> Option<Arc<Snapshot>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        if let Some(snapshot) = self.cached() {
            return snapshot;
        }
        let _guard = self.evaluation.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished the first evaluation while we waited.
        if let Some(snapshot) = self.cached() {
            return snapshot;
        }
        self.store(self.evaluate())
    }

    fn store(&self, result: VerificationResult) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot::new(result));
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn evaluate(&self) -> VerificationResult {
        let result = self.run_checks();
        match result.status() {
            LicenseStatus::Valid => {
                let entitled = result
                    .record()
                    .map(|r| r.entitlements().entitled_features())
                    .unwrap_or_default();
                info!(
                    license_id = result.license_id().unwrap_or_default(),
                    entitled = ?entitled,
                    "License verified"
                );
            }
            status => warn!(
                status = %status,
                code = ?result.error_code(),
                license_id = result.license_id().unwrap_or("-"),
                "License verification failed: {}",
                result.message()
            ),
        }
        result
    }

    fn run_checks(&self) -> VerificationResult {
        let record = match self.repository.load() {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return VerificationResult::failed(
                    LicenseStatus::Missing,
                    None,
                    format!("No license installed ({e})"),
                );
            }
            Err(e) => {
                return VerificationResult::failed(
                    LicenseStatus::InvalidFormat,
                    None,
                    format!("License file could not be read ({e})"),
                );
            }
        };
        let license_id = Some(record.license_id());

        let payload = match to_canonical_payload(&record) {
            Ok(payload) => payload,
            Err(e) => {
                return VerificationResult::failed(
                    LicenseStatus::InvalidFormat,
                    license_id,
                    format!("License payload could not be canonicalized ({e})"),
                );
            }
        };
        if !self.verifier.verify(&payload, record.signature()) {
            return VerificationResult::failed(
                LicenseStatus::InvalidSignature,
                license_id,
                format!(
                    "License signature is invalid (algorithm '{}', expected '{}')",
                    record.signature().algorithm(),
                    self.verifier.algorithm()
                ),
            );
        }

        if record.valid_until().has_passed((self.clock)()) {
            return VerificationResult::failed(
                LicenseStatus::Expired,
                license_id,
                format!("License expired on {}", record.valid_until()),
            );
        }

        let local = self.fingerprints.collect();
        if !record.allows(local.digest()) {
            let mut result = VerificationResult::failed(
                LicenseStatus::FingerprintMismatch,
                license_id,
                format!(
                    "This machine ({}) is not licensed; request a rehost",
                    local.digest().short()
                ),
            );
            result.mismatch = Some(FingerprintMismatch {
                allowed: record.allowed_fingerprints().to_vec(),
                local: local.digest().clone(),
            });
            return result;
        }

        VerificationResult::valid(record)
    }
}

impl fmt::Debug for LicensingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicensingService")
            .field("algorithm", &self.verifier.algorithm())
            .field("status", &self.cached_status())
            .finish()
    }
}
