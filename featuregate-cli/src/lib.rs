//! Report types and command bodies for the `featuregate` tool.
//!
//! Commands only read. Nothing here writes a license or talks to a network;
//! the one output artifact is a rehost request file.

use anyhow::{Context, Result};
use featuregate_license::{
    to_canonical_payload, ErrorCode, FeatureDescriptor, FeatureGatekeeper, FingerprintProvider,
    GateReport, LicenseRecord, LicenseStatus, LicensingService, RehostRequest,
};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Output of `featuregate fingerprint`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FingerprintReport {
    pub machine_guid: Option<String>,
    pub bios_uuid: Option<String>,
    pub baseboard_serial: Option<String>,
    pub canonical: String,
    pub digest: String,
    pub absent_slots: Vec<&'static str>,
}

pub fn fingerprint_report(provider: &dyn FingerprintProvider) -> FingerprintReport {
    let fp = provider.collect();
    FingerprintReport {
        machine_guid: fp.machine_guid().value().map(String::from),
        bios_uuid: fp.bios_uuid().value().map(String::from),
        baseboard_serial: fp.baseboard_serial().value().map(String::from),
        canonical: fp.canonical().to_string(),
        digest: fp.digest().to_string(),
        absent_slots: fp.absent_slots(),
    }
}

/// Output of `featuregate verify`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifyReport {
    pub status: LicenseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    pub entitled_features: Vec<String>,
}

impl VerifyReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }
}

/// Forces a fresh evaluation and summarizes it.
pub fn verify_report(service: &LicensingService) -> VerifyReport {
    let result = service.refresh();
    let record = result.record();
    VerifyReport {
        status: result.status(),
        code: result.error_code(),
        message: result.message().to_string(),
        license_id: result.license_id().map(String::from),
        customer: record.map(|r| r.customer().to_string()),
        valid_until: record.map(|r| r.valid_until().as_str().to_string()),
        entitled_features: result
            .entitlements()
            .entitled_features()
            .into_iter()
            .map(String::from)
            .collect(),
    }
}

/// Canonical payload bytes of a license file, exactly as they are signed.
pub fn canonicalize_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let record = LicenseRecord::from_slice(&bytes)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(to_canonical_payload(&record)?)
}

/// Reads a JSON array of feature descriptors.
pub fn load_descriptors(path: &Path) -> Result<Vec<FeatureDescriptor>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a JSON array of feature descriptors", path.display()))
}

/// Gates `descriptors` against the service's current entitlements.
pub fn gate_report(service: &LicensingService, descriptors: &[FeatureDescriptor]) -> GateReport {
    let entitlements = service.entitlements();
    FeatureGatekeeper::new().partition(descriptors, &entitlements)
}

/// Writes a rehost request to `out` when the machine does not match the
/// license. Returns `None` for any other status.
pub fn write_rehost(
    service: &LicensingService,
    reason: &str,
    out: &Path,
) -> Result<Option<RehostRequest>> {
    let Some(request) = service.rehost_request(reason) else {
        info!(status = %service.cached_status(), "No rehost needed");
        return Ok(None);
    };
    request
        .write_to(out)
        .with_context(|| format!("writing rehost request to {}", out.display()))?;
    Ok(Some(request))
}
