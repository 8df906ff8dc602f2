//! The parsed license record and its value types.

use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::FingerprintDigest;
use crate::signature::TaggedSignature;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema tag of the current artifact format.
pub const LICENSE_SCHEMA_V1: &str = "featuregate-license-v1";

/// Name of the field excluded from the canonical payload.
pub const SIGNATURE_FIELD: &str = "signature";

/// A license date: either a calendar day or an exact instant.
///
/// Accepts `YYYY-MM-DD` or RFC 3339. The source text is kept verbatim and is
/// what serializes back out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LicenseDate {
    text: String,
    point: DatePoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DatePoint {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl LicenseDate {
    /// Parses `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub fn parse(value: &str) -> LicenseResult<Self> {
        let point = if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            DatePoint::Day(day)
        } else {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| DatePoint::Instant(dt.with_timezone(&Utc)))
                .map_err(|_| {
                    LicenseError::InvalidFormat(format!(
                        "date '{value}' is neither YYYY-MM-DD nor RFC 3339"
                    ))
                })?
        };
        Ok(Self {
            text: value.to_string(),
            point,
        })
    }

    /// The date exactly as written in the artifact.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns true once `now` lies beyond this date.
    ///
    /// A calendar day stays valid until the end of that day, UTC.
    #[must_use]
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        match self.point {
            DatePoint::Day(day) => now.date_naive() > day,
            DatePoint::Instant(instant) => now > instant,
        }
    }
}

impl fmt::Display for LicenseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for LicenseDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for LicenseDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Feature code to entitlement flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entitlements(BTreeMap<String, bool>);

impl Entitlements {
    /// No entitlements; the fail-closed default.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true only for codes explicitly entitled `true`.
    #[must_use]
    pub fn is_entitled(&self, feature_code: &str) -> bool {
        self.0.get(feature_code).copied().unwrap_or(false)
    }

    /// Codes entitled `true`, sorted.
    #[must_use]
    pub fn entitled_features(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, entitled)| **entitled)
            .map(|(code, _)| code.as_str())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(code, entitled)| (code.as_str(), *entitled))
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for Entitlements {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A license as read from the artifact. Never mutated after parsing.
///
/// Serializing a record reproduces the signed fields as written: fingerprint
/// order and duplicates are kept, and dates keep their source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseRecord {
    schema: String,
    license_id: String,
    customer: String,
    issued_at: LicenseDate,
    valid_until: LicenseDate,
    allowed_fingerprints: Vec<FingerprintDigest>,
    entitlements: Entitlements,
    signature: TaggedSignature,
}

impl LicenseRecord {
    /// Parses a record from JSON bytes.
    ///
    /// Every field is required; identifiers must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidFormat`] on malformed JSON, a missing or
    /// unknown field, or a malformed date or digest.
    pub fn from_slice(bytes: &[u8]) -> LicenseResult<Self> {
        let record: Self = serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::InvalidFormat(e.to_string()))?;

        for (field, value) in [
            ("schema", &record.schema),
            ("license_id", &record.license_id),
            ("customer", &record.customer),
        ] {
            if value.trim().is_empty() {
                return Err(LicenseError::InvalidFormat(format!(
                    "field `{field}` must not be empty"
                )));
            }
        }
        Ok(record)
    }

    /// Returns a copy carrying `signature` in place of the current one.
    #[must_use]
    pub fn with_signature(&self, signature: TaggedSignature) -> Self {
        Self {
            signature,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn license_id(&self) -> &str {
        &self.license_id
    }

    #[must_use]
    pub fn customer(&self) -> &str {
        &self.customer
    }

    #[must_use]
    pub fn issued_at(&self) -> &LicenseDate {
        &self.issued_at
    }

    #[must_use]
    pub fn valid_until(&self) -> &LicenseDate {
        &self.valid_until
    }

    #[must_use]
    pub fn allowed_fingerprints(&self) -> &[FingerprintDigest] {
        &self.allowed_fingerprints
    }

    /// Returns true if `digest` is in the allowed set.
    #[must_use]
    pub fn allows(&self, digest: &FingerprintDigest) -> bool {
        self.allowed_fingerprints.contains(digest)
    }

    #[must_use]
    pub fn entitlements(&self) -> &Entitlements {
        &self.entitlements
    }

    #[must_use]
    pub fn signature(&self) -> &TaggedSignature {
        &self.signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_valid_through_end_of_day() {
        let date = LicenseDate::parse("2026-03-01").unwrap();
        let last_second = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap();
        let next_day = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        assert!(!date.has_passed(last_second));
        assert!(date.has_passed(next_day));
    }

    #[test]
    fn instant_keeps_source_text() {
        let date = LicenseDate::parse("2026-03-01T12:00:00.000+02:00").unwrap();
        assert_eq!(date.to_string(), "2026-03-01T12:00:00.000+02:00");
        assert!(!date.has_passed(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()));
        assert!(date.has_passed(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 1).unwrap()));
    }

    #[test]
    fn unpadded_day_kept_as_written() {
        let date = LicenseDate::parse("2026-12-1").unwrap();
        assert!(!date.has_passed(Utc.with_ymd_and_hms(2026, 12, 1, 23, 59, 59).unwrap()));
        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2026-12-1\"");
    }

    #[test]
    fn garbage_date_rejected() {
        assert!(LicenseDate::parse("31.12.2026").is_err());
        assert!(LicenseDate::parse("2026-13-01").is_err());
    }

    #[test]
    fn entitled_features_only_true_flags() {
        let e: Entitlements = [("b", true), ("a", true), ("c", false)].into_iter().collect();
        assert_eq!(e.entitled_features(), vec!["a", "b"]);
        assert!(!e.is_entitled("c"));
        assert!(!e.is_entitled("missing"));
    }
}
