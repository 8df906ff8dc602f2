//! Error types for the licensing module.
//!
//! `LicenseError` covers I/O, parse and configuration failures at the crate's
//! edges. Verification outcomes are never reported through it: the service
//! folds every failure into a [`crate::VerificationResult`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No license artifact exists at the configured location.
    #[error("license file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The artifact exists but could not be read.
    #[error("failed to read license file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content is not a well-formed license record.
    #[error("invalid license format: {0}")]
    InvalidFormat(String),

    /// Licensing configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file is not valid TOML.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns true if the artifact is absent, as opposed to unreadable or corrupt.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Machine-readable reason codes shared by verification results and gate decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// License file not found.
    LicenseMissing,
    /// License file is unreadable or structurally invalid.
    LicenseInvalidFormat,
    /// Signature did not verify over the canonical payload.
    LicenseInvalidSignature,
    /// License validity window has ended.
    LicenseExpired,
    /// Local machine is not in the allowed fingerprint set.
    LicenseFingerprintMismatch,
    /// Feature code is not entitled.
    FeatureNotEntitled,
    /// Feature descriptor is malformed.
    FeatureMetaInvalid,
    /// A hardware identifier could not be probed.
    FingerprintUnavailable,
}

impl ErrorCode {
    /// Returns the wire name of this code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LicenseMissing => "LICENSE_MISSING",
            Self::LicenseInvalidFormat => "LICENSE_INVALID_FORMAT",
            Self::LicenseInvalidSignature => "LICENSE_INVALID_SIGNATURE",
            Self::LicenseExpired => "LICENSE_EXPIRED",
            Self::LicenseFingerprintMismatch => "LICENSE_FINGERPRINT_MISMATCH",
            Self::FeatureNotEntitled => "FEATURE_NOT_ENTITLED",
            Self::FeatureMetaInvalid => "FEATURE_META_INVALID",
            Self::FingerprintUnavailable => "FINGERPRINT_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
