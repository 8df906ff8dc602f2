//! Machine fingerprinting for license binding.
//!
//! A fingerprint is three identifier slots probed independently:
//!
//! | Slot | Tag    | Source                                   |
//! |------|--------|------------------------------------------|
//! | 1    | `MG`   | persistent installation id (MachineGuid) |
//! | 2    | `UUID` | hardware/BIOS UUID                       |
//! | 3    | `MB`   | baseboard serial (optional)              |
//!
//! The canonical string is `MG=<v>|UUID=<v>|MB=<v>` with `-` standing in for
//! any slot that could not be probed, and the digest is
//! `hex:<sha256(canonical)>`. A probe failure only ever blanks its own slot.

use crate::error::{ErrorCode, LicenseError};
use crate::probe;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Encoding tag prefixed to every fingerprint digest.
pub const DIGEST_PREFIX: &str = "hex:";

/// Marker emitted in the canonical string for an absent slot.
pub const ABSENT_MARKER: &str = "-";

/// Upper bound on a single hardware probe before it degrades to absent.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const SLOT_TAGS: [&str; 3] = ["MG", "UUID", "MB"];

/// One identifier slot: a probed value or the absent marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum FingerprintSlot {
    Present(String),
    Absent,
}

impl FingerprintSlot {
    /// Normalizes a probe result; blank values count as absent.
    #[must_use]
    pub fn from_probe(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self::Present(v.trim().to_string()),
            _ => Self::Absent,
        }
    }

    /// Returns the probed value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    fn canonical_value(&self) -> &str {
        self.value().unwrap_or(ABSENT_MARKER)
    }
}

impl From<Option<String>> for FingerprintSlot {
    fn from(value: Option<String>) -> Self {
        Self::from_probe(value)
    }
}

impl From<FingerprintSlot> for Option<String> {
    fn from(slot: FingerprintSlot) -> Self {
        match slot {
            FingerprintSlot::Present(v) => Some(v),
            FingerprintSlot::Absent => None,
        }
    }
}

/// A tagged fingerprint digest, `hex:` followed by 64 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FingerprintDigest(String);

impl FingerprintDigest {
    /// Hashes a canonical fingerprint string.
    #[must_use]
    pub fn of(canonical: &str) -> Self {
        let hash = Sha256::digest(canonical.as_bytes());
        Self(format!("{DIGEST_PREFIX}{}", hex::encode(hash)))
    }

    /// Parses a tagged digest string.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidFormat`] if the tag is missing or the
    /// hash is not 64 lowercase hex digits.
    pub fn parse(value: &str) -> Result<Self, LicenseError> {
        let hash = value.strip_prefix(DIGEST_PREFIX).ok_or_else(|| {
            LicenseError::InvalidFormat(format!(
                "fingerprint digest must start with '{DIGEST_PREFIX}'"
            ))
        })?;
        let well_formed = hash.len() == 64
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(LicenseError::InvalidFormat(
                "fingerprint digest must be 64 lowercase hex digits".to_string(),
            ));
        }
        Ok(Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(DIGEST_PREFIX.len() + 12)]
    }
}

impl TryFrom<String> for FingerprintDigest {
    type Error = LicenseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FingerprintDigest> for String {
    fn from(digest: FingerprintDigest) -> Self {
        digest.0
    }
}

impl fmt::Display for FingerprintDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fingerprint of the local machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineFingerprint {
    machine_guid: FingerprintSlot,
    bios_uuid: FingerprintSlot,
    baseboard_serial: FingerprintSlot,
    canonical: String,
    digest: FingerprintDigest,
}

impl MachineFingerprint {
    /// Builds a fingerprint from the three slots in their fixed order.
    #[must_use]
    pub fn from_slots(
        machine_guid: FingerprintSlot,
        bios_uuid: FingerprintSlot,
        baseboard_serial: FingerprintSlot,
    ) -> Self {
        let canonical = [&machine_guid, &bios_uuid, &baseboard_serial]
            .iter()
            .zip(SLOT_TAGS)
            .map(|(slot, tag)| format!("{tag}={}", slot.canonical_value()))
            .collect::<Vec<_>>()
            .join("|");
        let digest = FingerprintDigest::of(&canonical);

        Self {
            machine_guid,
            bios_uuid,
            baseboard_serial,
            canonical,
            digest,
        }
    }

    /// A fingerprint with every slot absent.
    #[must_use]
    pub fn all_absent() -> Self {
        Self::from_slots(
            FingerprintSlot::Absent,
            FingerprintSlot::Absent,
            FingerprintSlot::Absent,
        )
    }

    #[must_use]
    pub fn machine_guid(&self) -> &FingerprintSlot {
        &self.machine_guid
    }

    #[must_use]
    pub fn bios_uuid(&self) -> &FingerprintSlot {
        &self.bios_uuid
    }

    #[must_use]
    pub fn baseboard_serial(&self) -> &FingerprintSlot {
        &self.baseboard_serial
    }

    /// Returns the canonical `MG=..|UUID=..|MB=..` string.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    #[must_use]
    pub fn digest(&self) -> &FingerprintDigest {
        &self.digest
    }

    /// Tags of the slots that could not be probed.
    #[must_use]
    pub fn absent_slots(&self) -> Vec<&'static str> {
        [&self.machine_guid, &self.bios_uuid, &self.baseboard_serial]
            .iter()
            .zip(SLOT_TAGS)
            .filter(|(slot, _)| slot.is_absent())
            .map(|(_, tag)| tag)
            .collect()
    }
}

/// Source of the local machine fingerprint.
///
/// Implementations must never fail: an identifier that cannot be read
/// degrades to [`FingerprintSlot::Absent`].
pub trait FingerprintProvider: Send + Sync {
    /// Probes the machine and returns a freshly computed fingerprint.
    fn collect(&self) -> MachineFingerprint;
}

/// Probes the running operating system.
///
/// Windows reads the registry MachineGuid and CIM BIOS/baseboard data, Linux
/// reads `machine-id` and DMI, macOS reads `ioreg`. Other platforms yield an
/// all-absent fingerprint.
#[derive(Debug, Clone)]
pub struct SystemFingerprintProvider {
    timeout: Duration,
}

impl SystemFingerprintProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Sets the per-probe timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SystemFingerprintProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintProvider for SystemFingerprintProvider {
    fn collect(&self) -> MachineFingerprint {
        let fingerprint = MachineFingerprint::from_slots(
            FingerprintSlot::from_probe(probe::machine_guid(self.timeout)),
            FingerprintSlot::from_probe(probe::bios_uuid(self.timeout)),
            FingerprintSlot::from_probe(probe::baseboard_serial(self.timeout)),
        );

        for tag in fingerprint.absent_slots() {
            warn!(
                code = %ErrorCode::FingerprintUnavailable,
                slot = tag,
                "Hardware identifier unavailable, using absent marker"
            );
        }
        debug!(digest = %fingerprint.digest().short(), "Machine fingerprint collected");
        fingerprint
    }
}

/// Returns a fixed fingerprint.
///
/// Used by embedders that obtain identifiers through their own channel, and
/// by tests.
#[derive(Debug, Clone)]
pub struct StaticFingerprintProvider {
    fingerprint: MachineFingerprint,
}

impl StaticFingerprintProvider {
    #[must_use]
    pub fn new(
        machine_guid: Option<&str>,
        bios_uuid: Option<&str>,
        baseboard_serial: Option<&str>,
    ) -> Self {
        Self {
            fingerprint: MachineFingerprint::from_slots(
                FingerprintSlot::from_probe(machine_guid.map(String::from)),
                FingerprintSlot::from_probe(bios_uuid.map(String::from)),
                FingerprintSlot::from_probe(baseboard_serial.map(String::from)),
            ),
        }
    }

    #[must_use]
    pub fn from_fingerprint(fingerprint: MachineFingerprint) -> Self {
        Self { fingerprint }
    }
}

impl FingerprintProvider for StaticFingerprintProvider {
    fn collect(&self) -> MachineFingerprint {
        self.fingerprint.clone()
    }
}
