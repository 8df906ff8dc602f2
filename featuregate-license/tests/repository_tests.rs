mod common;

use common::{default_entitlements, digest_of, license_json, machine_a, sign_hmac, write_license};
use featuregate_license::{
    FileLicenseRepository, LicenseError, LicenseRepository, LICENSE_SCHEMA_V1, MAX_LICENSE_BYTES,
};
use serde_json::json;

#[test]
fn load_signed_file() {
    let dir = tempfile::tempdir().unwrap();
    let digest = digest_of(&machine_a());
    let path = write_license(dir.path(), &sign_hmac(&license_json(&[&digest], default_entitlements())));

    let record = FileLicenseRepository::new(&path).load().unwrap();
    assert_eq!(record.license_id(), "LIC-2026-0042");
    assert_eq!(record.customer(), "ACME GmbH");
    assert_eq!(record.schema(), LICENSE_SCHEMA_V1);
    assert!(record.allows(&digest));
    assert!(record.entitlements().is_entitled("reporting"));
    assert!(!record.entitlements().is_entitled("export_pdf"));
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let repo = FileLicenseRepository::new(dir.path().join("absent.lic"));
    let err = repo.load().unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, LicenseError::NotFound(p) if p.ends_with("absent.lic")));
}

#[test]
fn directory_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let err = FileLicenseRepository::new(dir.path()).load().unwrap_err();
    assert!(matches!(err, LicenseError::InvalidFormat(_)));
}

#[test]
fn oversized_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_license(dir.path(), &vec![b' '; MAX_LICENSE_BYTES as usize + 1]);
    let err = FileLicenseRepository::new(&path).load().unwrap_err();
    assert!(matches!(err, LicenseError::InvalidFormat(msg) if msg.contains("limit")));
}

#[test]
fn not_json_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_license(dir.path(), b"this is not a license");
    let err = FileLicenseRepository::new(&path).load().unwrap_err();
    assert!(matches!(err, LicenseError::InvalidFormat(_)));
    assert!(!err.is_not_found());
}

#[test]
fn missing_field_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = license_json(&[], default_entitlements());
    doc.as_object_mut().unwrap().remove("valid_until");
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());
    let err = FileLicenseRepository::new(&path).load().unwrap_err();
    assert!(matches!(err, LicenseError::InvalidFormat(msg) if msg.contains("valid_until")));
}

#[test]
fn unknown_field_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = license_json(&[], default_entitlements());
    doc["max_seats"] = json!(10);
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());
    assert!(matches!(
        FileLicenseRepository::new(&path).load(),
        Err(LicenseError::InvalidFormat(_))
    ));
}

#[test]
fn bad_date_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = license_json(&[], default_entitlements());
    doc["valid_until"] = json!("31.12.2026");
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());
    assert!(matches!(
        FileLicenseRepository::new(&path).load(),
        Err(LicenseError::InvalidFormat(_))
    ));
}

#[test]
fn bad_fingerprint_digest_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = license_json(&[], default_entitlements());
    doc["allowed_fingerprints"] = json!(["sha256:abc"]);
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());
    assert!(matches!(
        FileLicenseRepository::new(&path).load(),
        Err(LicenseError::InvalidFormat(_))
    ));
}

#[test]
fn non_boolean_entitlement_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let doc = license_json(&[], json!({ "reporting": "yes" }));
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());
    assert!(matches!(
        FileLicenseRepository::new(&path).load(),
        Err(LicenseError::InvalidFormat(_))
    ));
}

#[test]
fn empty_license_id_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = license_json(&[], default_entitlements());
    doc["license_id"] = json!("  ");
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());
    assert!(matches!(
        FileLicenseRepository::new(&path).load(),
        Err(LicenseError::InvalidFormat(msg)) if msg.contains("license_id")
    ));
}

#[test]
fn schema_mismatch_is_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = license_json(&[], default_entitlements());
    doc["schema"] = json!("featuregate-license-v2");
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());

    let err = FileLicenseRepository::new(&path).load().unwrap_err();
    assert!(matches!(err, LicenseError::InvalidFormat(msg) if msg.contains("v2")));

    let custom = FileLicenseRepository::new(&path).with_expected_schema("featuregate-license-v2");
    assert!(custom.load().is_ok());
}

#[test]
fn fingerprint_list_kept_as_written() {
    let dir = tempfile::tempdir().unwrap();
    let digest = digest_of(&machine_a());
    let doc = license_json(&[&digest, &digest], default_entitlements());
    let path = write_license(dir.path(), &serde_json::to_vec(&doc).unwrap());
    let record = FileLicenseRepository::new(&path).load().unwrap();
    assert_eq!(record.allowed_fingerprints(), [digest.clone(), digest.clone()].as_slice());
    assert!(record.allows(&digest));
}

#[test]
fn path_accessor() {
    let repo = FileLicenseRepository::new("/opt/license.lic");
    assert_eq!(repo.path(), std::path::Path::new("/opt/license.lic"));
}
