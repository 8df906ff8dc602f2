//! License signature verification.
//!
//! The artifact's `signature` field is either a bare `b64:<base64>` string,
//! which implies [`HMAC_SHA256`], or an object naming the algorithm:
//!
//! ```json
//! { "alg": "ed25519", "value": "b64:..." }
//! ```
//!
//! Verifiers never error. A wrong algorithm tag, an undecodable value or a
//! mismatch all verify as `false`.

use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Keyed-digest reference scheme.
pub const HMAC_SHA256: &str = "hmac-sha256";

/// Asymmetric scheme.
pub const ED25519: &str = "ed25519";

/// Shortest verification secret accepted for [`HMAC_SHA256`].
pub const MIN_SECRET_LEN: usize = 16;

const BASE64_TAG: &str = "b64:";
const HEX_TAG: &str = "hex:";

type HmacSha256 = Hmac<Sha256>;

/// Decodes a `b64:` or `hex:` tagged value.
pub(crate) fn decode_tagged(encoded: &str) -> Option<Vec<u8>> {
    let encoded = encoded.trim();
    if let Some(b64) = encoded.strip_prefix(BASE64_TAG) {
        BASE64.decode(b64).ok()
    } else if let Some(hex_str) = encoded.strip_prefix(HEX_TAG) {
        hex::decode(hex_str).ok()
    } else {
        None
    }
}

/// Signature bytes in their tagged text encoding, plus the algorithm tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSignature {
    algorithm: String,
    encoded: String,
}

impl TaggedSignature {
    #[must_use]
    pub fn new(algorithm: impl Into<String>, encoded: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            encoded: encoded.into(),
        }
    }

    /// Encodes raw signature bytes as `b64:<base64>`.
    #[must_use]
    pub fn from_bytes(algorithm: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(algorithm, format!("{BASE64_TAG}{}", BASE64.encode(bytes)))
    }

    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The tagged text form, e.g. `b64:...`.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Decodes the signature bytes, or `None` if the encoding is unknown or corrupt.
    #[must_use]
    pub fn decode(&self) -> Option<Vec<u8>> {
        decode_tagged(&self.encoded)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SignatureRepr {
    Bare(String),
    Tagged { alg: String, value: String },
}

impl Serialize for TaggedSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = if self.algorithm == HMAC_SHA256 {
            SignatureRepr::Bare(self.encoded.clone())
        } else {
            SignatureRepr::Tagged {
                alg: self.algorithm.clone(),
                value: self.encoded.clone(),
            }
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaggedSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SignatureRepr::deserialize(deserializer)? {
            SignatureRepr::Bare(value) => Self::new(HMAC_SHA256, value),
            SignatureRepr::Tagged { alg, value } => Self::new(alg, value),
        })
    }
}

/// A secret used by the keyed-digest scheme, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VerificationSecret {
    bytes: Vec<u8>,
}

impl VerificationSecret {
    /// Wraps raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Config`] if the secret is shorter than
    /// [`MIN_SECRET_LEN`].
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> LicenseResult<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(LicenseError::Config(format!(
                "verification secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Decodes a `b64:` or `hex:` tagged secret.
    pub fn decode(encoded: &str) -> LicenseResult<Self> {
        let bytes = decode_tagged(encoded).ok_or_else(|| {
            LicenseError::Config("verification secret must be 'b64:' or 'hex:' encoded".to_string())
        })?;
        Self::from_bytes(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for VerificationSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Checks a signature over a canonical payload.
///
/// The verification key is bound when the verifier is built, so callers
/// never see scheme-specific key material.
pub trait SignatureVerifier: Send + Sync {
    /// The algorithm tag this verifier accepts.
    fn algorithm(&self) -> &str;

    /// Returns true only if `signature` is tagged with [`Self::algorithm`],
    /// decodes, and matches `payload`.
    fn verify(&self, payload: &[u8], signature: &TaggedSignature) -> bool;
}

/// HMAC-SHA256 over the canonical payload with a provisioned secret.
#[derive(Debug, Clone)]
pub struct HmacSha256Verifier {
    secret: VerificationSecret,
}

impl HmacSha256Verifier {
    #[must_use]
    pub fn new(secret: VerificationSecret) -> Self {
        Self { secret }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.as_bytes()).ok()
    }

    /// Produces a `b64:` signature for `payload` with the same secret.
    ///
    /// Intended for issuance tooling and tests; verification never calls it.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> Option<TaggedSignature> {
        let mut mac = self.mac()?;
        mac.update(payload);
        let tag = mac.finalize().into_bytes();
        Some(TaggedSignature::from_bytes(HMAC_SHA256, &tag))
    }
}

impl SignatureVerifier for HmacSha256Verifier {
    fn algorithm(&self) -> &str {
        HMAC_SHA256
    }

    fn verify(&self, payload: &[u8], signature: &TaggedSignature) -> bool {
        if signature.algorithm() != HMAC_SHA256 {
            return false;
        }
        let (Some(expected), Some(mut mac)) = (signature.decode(), self.mac()) else {
            return false;
        };
        mac.update(payload);
        // Constant-time comparison.
        mac.verify_slice(&expected).is_ok()
    }
}

/// Ed25519 verification with an embedded or provisioned public key.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Builds a verifier from a 32-byte public key.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Config`] if the bytes are not a valid point.
    pub fn from_bytes(public_key: &[u8; 32]) -> LicenseResult<Self> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|_| LicenseError::Config("invalid Ed25519 public key".to_string()))?;
        Ok(Self { key })
    }

    /// Decodes a `b64:` or `hex:` tagged public key.
    pub fn decode(encoded: &str) -> LicenseResult<Self> {
        let bytes = decode_tagged(encoded).ok_or_else(|| {
            LicenseError::Config("Ed25519 public key must be 'b64:' or 'hex:' encoded".to_string())
        })?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            LicenseError::Config("Ed25519 public key must be 32 bytes".to_string())
        })?;
        Self::from_bytes(&key)
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn algorithm(&self) -> &str {
        ED25519
    }

    fn verify(&self, payload: &[u8], signature: &TaggedSignature) -> bool {
        if signature.algorithm() != ED25519 {
            return false;
        }
        let Some(bytes) = signature.decode() else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&bytes) else {
            return false;
        };
        self.key.verify(payload, &sig).is_ok()
    }
}
