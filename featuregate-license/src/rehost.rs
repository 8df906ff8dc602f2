//! Rehost requests for licenses bound to replaced hardware.
//!
//! A request is written to a file and carried to the issuer out of band.

use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::FingerprintDigest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Asks the issuer to rebind `license_id` to `new_fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehostRequest {
    /// Time-ordered id for correlating the reissued license.
    pub request_id: Uuid,
    pub license_id: String,
    /// Digests the current license is bound to.
    pub old_fingerprints: Vec<FingerprintDigest>,
    /// Digest of this machine.
    pub new_fingerprint: FingerprintDigest,
    pub requested_at: DateTime<Utc>,
    /// Operator-supplied explanation, e.g. "mainboard replaced".
    pub reason: String,
}

impl RehostRequest {
    #[must_use]
    pub fn new(
        license_id: impl Into<String>,
        old_fingerprints: Vec<FingerprintDigest>,
        new_fingerprint: FingerprintDigest,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            license_id: license_id.into(),
            old_fingerprints,
            new_fingerprint,
            requested_at: Utc::now(),
            reason: reason.into(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> LicenseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the request as JSON, creating parent directories.
    pub fn write_to(&self, path: &Path) -> LicenseResult<()> {
        let io_err = |source| LicenseError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_json()?).map_err(io_err)?;

        info!(
            license_id = %self.license_id,
            request_id = %self.request_id,
            path = %path.display(),
            "Rehost request written"
        );
        Ok(())
    }
}
