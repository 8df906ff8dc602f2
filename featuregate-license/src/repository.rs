//! Loading license artifacts.
//!
//! A repository only reads and parses. Signature, expiry and fingerprint
//! checks belong to [`crate::LicensingService`].

use crate::error::{LicenseError, LicenseResult};
use crate::record::{LicenseRecord, LICENSE_SCHEMA_V1};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Largest artifact accepted; anything bigger is not a license.
pub const MAX_LICENSE_BYTES: u64 = 1024 * 1024;

/// Source of the license record.
pub trait LicenseRepository: Send + Sync {
    /// Reads and parses the license.
    ///
    /// # Errors
    ///
    /// [`LicenseError::NotFound`] when no artifact exists; any other variant
    /// means the artifact exists but is unreadable or malformed.
    fn load(&self) -> LicenseResult<LicenseRecord>;
}

/// Reads a JSON license file from a fixed path.
#[derive(Debug, Clone)]
pub struct FileLicenseRepository {
    path: PathBuf,
    expected_schema: String,
}

impl FileLicenseRepository {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            expected_schema: LICENSE_SCHEMA_V1.to_string(),
        }
    }

    /// Overrides the schema tag that records must carry.
    #[must_use]
    pub fn with_expected_schema(mut self, schema: impl Into<String>) -> Self {
        self.expected_schema = schema.into();
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_bytes(&self) -> LicenseResult<Vec<u8>> {
        let io_err = |source| LicenseError::Io {
            path: self.path.clone(),
            source,
        };

        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LicenseError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(io_err(e)),
        };
        if !metadata.is_file() {
            return Err(LicenseError::InvalidFormat(format!(
                "{} is not a regular file",
                self.path.display()
            )));
        }
        if metadata.len() > MAX_LICENSE_BYTES {
            return Err(LicenseError::InvalidFormat(format!(
                "license file is {} bytes, limit is {MAX_LICENSE_BYTES}",
                metadata.len()
            )));
        }

        std::fs::read(&self.path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                LicenseError::NotFound(self.path.clone())
            } else {
                io_err(e)
            }
        })
    }
}

impl LicenseRepository for FileLicenseRepository {
    fn load(&self) -> LicenseResult<LicenseRecord> {
        let bytes = self.read_bytes().inspect_err(|e| {
            if e.is_not_found() {
                warn!(path = %self.path.display(), "License file not found");
            } else {
                warn!(path = %self.path.display(), "License file unreadable: {}", e);
            }
        })?;

        let record = LicenseRecord::from_slice(&bytes).inspect_err(|e| {
            warn!(path = %self.path.display(), "License file malformed: {}", e);
        })?;

        if record.schema() != self.expected_schema {
            warn!(
                schema = record.schema(),
                expected = %self.expected_schema,
                "Unsupported license schema"
            );
            return Err(LicenseError::InvalidFormat(format!(
                "unsupported schema '{}', expected '{}'",
                record.schema(),
                self.expected_schema
            )));
        }

        debug!(license_id = record.license_id(), "License record loaded");
        Ok(record)
    }
}
