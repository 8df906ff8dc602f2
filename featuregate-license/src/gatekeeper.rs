//! Per-feature allow/deny decisions.
//!
//! The gatekeeper only looks at the descriptor and the entitlements it is
//! handed. It never loads or refreshes a license, so feature discovery can
//! call it for every module at startup.

use crate::error::ErrorCode;
use crate::record::Entitlements;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Licensing section of a feature descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensingRequirement {
    #[serde(default)]
    pub requires_license: bool,
    #[serde(default)]
    pub feature_code: Option<String>,
}

/// What the feature-discovery collaborator knows about one feature.
///
/// Extra descriptor keys (label, version, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub id: String,
    #[serde(default)]
    pub is_core: bool,
    #[serde(default)]
    pub licensing: Option<LicensingRequirement>,
}

impl FeatureDescriptor {
    /// Core infrastructure, always allowed.
    #[must_use]
    pub fn core(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_core: true,
            licensing: None,
        }
    }

    /// A feature that needs no license.
    #[must_use]
    pub fn unlicensed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_core: false,
            licensing: None,
        }
    }

    /// A feature gated on `feature_code`.
    #[must_use]
    pub fn licensed(id: impl Into<String>, feature_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_core: false,
            licensing: Some(LicensingRequirement {
                requires_license: true,
                feature_code: Some(feature_code.into()),
            }),
        }
    }

    fn requires_license(&self) -> bool {
        self.licensing.as_ref().is_some_and(|l| l.requires_license)
    }
}

/// Why a decision went the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateReason {
    CoreBypass,
    UnlicensedFeature,
    Entitled,
    FeatureMetaInvalid,
    FeatureNotEntitled,
}

impl GateReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoreBypass => "core-bypass",
            Self::UnlicensedFeature => "unlicensed-feature",
            Self::Entitled => "entitled",
            Self::FeatureMetaInvalid => "feature-meta-invalid",
            Self::FeatureNotEntitled => "feature-not-entitled",
        }
    }

    /// Taxonomy code for denials.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::FeatureMetaInvalid => Some(ErrorCode::FeatureMetaInvalid),
            Self::FeatureNotEntitled => Some(ErrorCode::FeatureNotEntitled),
            Self::CoreBypass | Self::UnlicensedFeature | Self::Entitled => None,
        }
    }
}

/// Result of gating one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// The licensing feature code, or the descriptor id when there is none.
    pub feature_code: String,
    pub allowed: bool,
    pub reason: GateReason,
    /// Diagnostic for operators.
    pub message: String,
}

impl GateDecision {
    fn allow(feature_code: &str, reason: GateReason, message: String) -> Self {
        Self {
            feature_code: feature_code.to_string(),
            allowed: true,
            reason,
            message,
        }
    }

    fn deny(feature_code: &str, reason: GateReason, message: String) -> Self {
        Self {
            feature_code: feature_code.to_string(),
            allowed: false,
            reason,
            message,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.reason.error_code()
    }
}

/// Decisions for a batch of descriptors, split by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub allowed: Vec<GateDecision>,
    pub blocked: Vec<GateDecision>,
}

/// Returns true for codes made only of `a-z`, `0-9` and `_`.
#[must_use]
pub fn is_valid_feature_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Decides whether a feature may register.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureGatekeeper;

impl FeatureGatekeeper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decision order: core bypass, no licensing requirement, code format,
    /// entitlement lookup.
    #[must_use]
    pub fn check_feature(
        &self,
        descriptor: &FeatureDescriptor,
        entitlements: &Entitlements,
    ) -> GateDecision {
        if descriptor.is_core {
            debug!(feature = %descriptor.id, "Core feature, bypassing license check");
            return GateDecision::allow(
                &descriptor.id,
                GateReason::CoreBypass,
                "Core feature is always allowed".to_string(),
            );
        }

        if !descriptor.requires_license() {
            debug!(feature = %descriptor.id, "Feature does not require a license");
            return GateDecision::allow(
                &descriptor.id,
                GateReason::UnlicensedFeature,
                "Feature does not require a license".to_string(),
            );
        }

        let code = descriptor
            .licensing
            .as_ref()
            .and_then(|l| l.feature_code.as_deref())
            .unwrap_or_default();
        if code.is_empty() {
            warn!(feature = %descriptor.id, "Licensed feature has no feature code");
            return GateDecision::deny(
                &descriptor.id,
                GateReason::FeatureMetaInvalid,
                "Feature requires a license but declares no feature code".to_string(),
            );
        }
        if !is_valid_feature_code(code) {
            warn!(feature = %descriptor.id, code, "Invalid feature code format");
            return GateDecision::deny(
                code,
                GateReason::FeatureMetaInvalid,
                format!("Invalid feature code '{code}' (allowed: a-z, 0-9, _)"),
            );
        }

        if entitlements.is_entitled(code) {
            info!(feature = %descriptor.id, code, "Feature entitled");
            GateDecision::allow(
                code,
                GateReason::Entitled,
                format!("Feature '{code}' is entitled by the license"),
            )
        } else {
            warn!(feature = %descriptor.id, code, "Feature not entitled, blocking");
            GateDecision::deny(
                code,
                GateReason::FeatureNotEntitled,
                format!("Feature '{code}' is not entitled by the license"),
            )
        }
    }

    /// Gates every descriptor and splits the decisions by outcome, keeping
    /// input order.
    #[must_use]
    pub fn partition<'a>(
        &self,
        descriptors: impl IntoIterator<Item = &'a FeatureDescriptor>,
        entitlements: &Entitlements,
    ) -> GateReport {
        let mut report = GateReport::default();
        for descriptor in descriptors {
            let decision = self.check_feature(descriptor, entitlements);
            if decision.allowed {
                report.allowed.push(decision);
            } else {
                report.blocked.push(decision);
            }
        }
        info!(
            allowed = report.allowed.len(),
            blocked = report.blocked.len(),
            "Feature gating complete"
        );
        report
    }
}
