//! Licensing configuration, read from `licensing.toml`.
//!
//! ```toml
//! license_path = '%PROGRAMDATA%\FeatureGate\license.lic'
//! probe_timeout_ms = 5000
//!
//! [signature]
//! algorithm = "hmac-sha256"   # or "ed25519"
//! key_env = "FEATUREGATE_LICENSE_KEY"
//! ```
//!
//! Exactly one of `key`, `key_env` or `key_file` supplies the verification
//! key, encoded as `b64:...` or `hex:...`.

use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::{SystemFingerprintProvider, DEFAULT_PROBE_TIMEOUT};
use crate::record::LICENSE_SCHEMA_V1;
use crate::repository::FileLicenseRepository;
use crate::signature::{Ed25519Verifier, HmacSha256Verifier, SignatureVerifier, VerificationSecret};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory standing in for `%PROGRAMDATA%\<vendor>` on non-Windows hosts.
pub const UNIX_DATA_DIR: &str = "/var/lib/featuregate";

const CONFIG_DIR_NAME: &str = "featuregate";
const CONFIG_FILE_NAME: &str = "licensing.toml";

/// Signature scheme expected on license artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    #[default]
    HmacSha256,
    Ed25519,
}

/// Where the verification key comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureConfig {
    #[serde(default)]
    pub algorithm: SignatureAlgorithm,
    /// Inline encoded key.
    #[serde(default)]
    pub key: Option<String>,
    /// Environment variable holding the encoded key.
    #[serde(default)]
    pub key_env: Option<String>,
    /// File holding the encoded key.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl SignatureConfig {
    fn encoded_key(&self) -> LicenseResult<String> {
        match (&self.key, &self.key_env, &self.key_file) {
            (Some(key), None, None) => Ok(key.clone()),
            (None, Some(var), None) => std::env::var(var).map_err(|_| {
                LicenseError::Config(format!("environment variable {var} is not set"))
            }),
            (None, None, Some(path)) => std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|source| LicenseError::Io {
                    path: path.clone(),
                    source,
                }),
            (None, None, None) => Err(LicenseError::Config(
                "no verification key configured (set one of key, key_env, key_file)".to_string(),
            )),
            _ => Err(LicenseError::Config(
                "only one of key, key_env, key_file may be set".to_string(),
            )),
        }
    }
}

/// Licensing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicensingConfig {
    /// License file location; `%VAR%`, `$VAR` and `${VAR}` are expanded.
    #[serde(default = "default_license_path")]
    pub license_path: String,
    #[serde(default = "default_expected_schema")]
    pub expected_schema: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub signature: SignatureConfig,
}

fn default_license_path() -> String {
    if cfg!(windows) {
        r"%PROGRAMDATA%\FeatureGate\license.lic".to_string()
    } else {
        format!("{UNIX_DATA_DIR}/license.lic")
    }
}

fn default_expected_schema() -> String {
    LICENSE_SCHEMA_V1.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

impl Default for LicensingConfig {
    fn default() -> Self {
        Self {
            license_path: default_license_path(),
            expected_schema: default_expected_schema(),
            probe_timeout_ms: default_probe_timeout_ms(),
            signature: SignatureConfig::default(),
        }
    }
}

impl LicensingConfig {
    /// `<config dir>/featuregate/licensing.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Loads from [`Self::default_path`].
    pub fn load() -> LicenseResult<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Loads from an explicit path. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> LicenseResult<Self> {
        if !path.exists() {
            info!("No licensing config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| LicenseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded licensing config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> LicenseResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// License path with environment variables expanded.
    #[must_use]
    pub fn resolved_license_path(&self) -> PathBuf {
        resolve_license_path(&self.license_path)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    #[must_use]
    pub fn repository(&self) -> FileLicenseRepository {
        FileLicenseRepository::new(self.resolved_license_path())
            .with_expected_schema(self.expected_schema.clone())
    }

    #[must_use]
    pub fn fingerprint_provider(&self) -> SystemFingerprintProvider {
        SystemFingerprintProvider::new().with_timeout(self.probe_timeout())
    }

    /// Builds the verifier for the configured algorithm and key.
    pub fn verifier(&self) -> LicenseResult<Box<dyn SignatureVerifier>> {
        let encoded = self.signature.encoded_key()?;
        debug!(algorithm = ?self.signature.algorithm, "Building signature verifier");
        Ok(match self.signature.algorithm {
            SignatureAlgorithm::HmacSha256 => Box::new(HmacSha256Verifier::new(
                VerificationSecret::decode(&encoded)?,
            )),
            SignatureAlgorithm::Ed25519 => Box::new(Ed25519Verifier::decode(&encoded)?),
        })
    }
}

/// Expands environment variables in a license path template.
///
/// On hosts other than Windows a `%PROGRAMDATA%` template maps to
/// [`UNIX_DATA_DIR`] joined with the template's file name.
#[must_use]
pub fn resolve_license_path(template: &str) -> PathBuf {
    if !cfg!(windows) && template.contains("%PROGRAMDATA%") {
        let file_name = template
            .rsplit(['\\', '/'])
            .next()
            .filter(|name| !name.is_empty() && !name.contains('%'))
            .unwrap_or("license.lic");
        return Path::new(UNIX_DATA_DIR).join(file_name);
    }
    PathBuf::from(expand_vars(template, |name| std::env::var(name).ok()))
}

/// Expands `%VAR%`, `${VAR}` and `$VAR`. Unknown variables are left verbatim.
fn expand_vars(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['%', '$']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (name, consumed) = if let Some(after) = tail.strip_prefix('%') {
            match after.find('%') {
                Some(end) => (&after[..end], end + 2),
                None => ("", 0),
            }
        } else if let Some(after) = tail.strip_prefix("${") {
            match after.find('}') {
                Some(end) => (&after[..end], end + 3),
                None => ("", 0),
            }
        } else {
            let after = &tail[1..];
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end + 1)
        };

        match (consumed, lookup(name)) {
            (0, _) => {
                out.push_str(tail);
                return out;
            }
            (_, Some(value)) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&tail[..consumed.max(1)]),
        }
        rest = &tail[consumed.max(1)..];
    }
    out.push_str(rest);
    out
}
