//! Protocol value types shared across the pipeline

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VcpError};

/// Verification result codes, ordered by pipeline position.
///
/// `Valid` is the only success; every other member names the first check
/// that failed. The discriminants are stable and define the audit-log
/// check-prefix derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationResult {
    Valid = 0,
    SizeExceeded = 1,
    InvalidSchema = 2,
    UntrustedIssuer = 3,
    InvalidSignature = 4,
    UntrustedAuditor = 5,
    InvalidAttestation = 6,
    HashMismatch = 7,
    NotYetValid = 8,
    Expired = 9,
    FutureTimestamp = 10,
    ReplayDetected = 11,
    TokenMismatch = 12,
    BudgetExceeded = 13,
    ScopeMismatch = 14,
    Revoked = 15,
    FetchFailed = 16,
}

impl VerificationResult {
    /// True only for `Valid`.
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Stable SCREAMING_SNAKE_CASE name used in audit entries and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::SizeExceeded => "SIZE_EXCEEDED",
            Self::InvalidSchema => "INVALID_SCHEMA",
            Self::UntrustedIssuer => "UNTRUSTED_ISSUER",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::UntrustedAuditor => "UNTRUSTED_AUDITOR",
            Self::InvalidAttestation => "INVALID_ATTESTATION",
            Self::HashMismatch => "HASH_MISMATCH",
            Self::NotYetValid => "NOT_YET_VALID",
            Self::Expired => "EXPIRED",
            Self::FutureTimestamp => "FUTURE_TIMESTAMP",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::TokenMismatch => "TOKEN_MISMATCH",
            Self::BudgetExceeded => "BUDGET_EXCEEDED",
            Self::ScopeMismatch => "SCOPE_MISMATCH",
            Self::Revoked => "REVOKED",
            Self::FetchFailed => "FETCH_FAILED",
        }
    }

    /// Coarse failure category for metrics and UX mapping.
    pub fn category(self) -> &'static str {
        match self {
            Self::Valid => "success",
            Self::InvalidSignature
            | Self::InvalidAttestation
            | Self::HashMismatch
            | Self::FutureTimestamp
            | Self::ReplayDetected
            | Self::TokenMismatch
            | Self::SizeExceeded
            | Self::Revoked => "security",
            Self::NotYetValid | Self::Expired => "temporal",
            Self::FetchFailed => "transient",
            _ => "configuration",
        }
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The named checks of the verification pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineCheck {
    Size,
    Schema,
    Hash,
    Issuer,
    Signature,
    Auditor,
    Attestation,
    Revocation,
    Temporal,
    Replay,
    Token,
    Budget,
    Scope,
    Scan,
}

impl PipelineCheck {
    /// All checks in pipeline order.
    pub const ALL: [PipelineCheck; 14] = [
        PipelineCheck::Size,
        PipelineCheck::Schema,
        PipelineCheck::Hash,
        PipelineCheck::Issuer,
        PipelineCheck::Signature,
        PipelineCheck::Auditor,
        PipelineCheck::Attestation,
        PipelineCheck::Revocation,
        PipelineCheck::Temporal,
        PipelineCheck::Replay,
        PipelineCheck::Token,
        PipelineCheck::Budget,
        PipelineCheck::Scope,
        PipelineCheck::Scan,
    ];

    /// Stable check name used in audit entries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Schema => "schema",
            Self::Hash => "hash",
            Self::Issuer => "issuer",
            Self::Signature => "signature",
            Self::Auditor => "auditor",
            Self::Attestation => "attestation",
            Self::Revocation => "revocation",
            Self::Temporal => "temporal",
            Self::Replay => "replay",
            Self::Token => "token",
            Self::Budget => "budget",
            Self::Scope => "scope",
            Self::Scan => "scan",
        }
    }
}

/// A verification outcome paired with the check it failed at.
///
/// The result code alone does not always identify the failing step:
/// `INVALID_ATTESTATION` is produced by the attestation-signature
/// check, by a strict-mode injection scan, and by a pre_inject hook
/// abort. The report disambiguates so the audit log can record the
/// exact prefix of checks that passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub result: VerificationResult,
    /// The check the pipeline failed at; `None` on success and for
    /// failures occurring after every check passed (pre_inject hook
    /// aborts)
    pub failed_check: Option<PipelineCheck>,
}

impl VerificationReport {
    /// Successful outcome.
    pub fn valid() -> Self {
        Self {
            result: VerificationResult::Valid,
            failed_check: None,
        }
    }

    /// Failure at a named check.
    pub fn failed(result: VerificationResult, check: PipelineCheck) -> Self {
        Self {
            result,
            failed_check: Some(check),
        }
    }

    /// Failure after every named check passed (hook abort).
    pub fn failed_after_checks(result: VerificationResult) -> Self {
        Self {
            result,
            failed_check: None,
        }
    }

    /// Names of the checks that passed: the full ordered list on
    /// success (and for post-check failures), otherwise the prefix up
    /// to but not including the failing check.
    pub fn checks_passed(&self) -> Vec<&'static str> {
        match self.failed_check {
            Some(failed) => PipelineCheck::ALL
                .iter()
                .take_while(|check| **check != failed)
                .map(|check| check.as_str())
                .collect(),
            None => PipelineCheck::ALL.iter().map(|check| check.as_str()).collect(),
        }
    }
}

/// Composition modes for multi-constitution scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionMode {
    Base,
    Extend,
    Override,
    Strict,
}

impl CompositionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Extend => "extend",
            Self::Override => "override",
            Self::Strict => "strict",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "base" => Ok(Self::Base),
            "extend" => Ok(Self::Extend),
            "override" => Ok(Self::Override),
            "strict" => Ok(Self::Strict),
            other => Err(VcpError::invalid(format!("unknown composition mode: {other}"))),
        }
    }
}

/// Safety attestation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationType {
    #[serde(rename = "injection-safe")]
    InjectionSafe,
    #[serde(rename = "content-safe")]
    ContentSafe,
    #[serde(rename = "full-audit")]
    FullAudit,
}

impl AttestationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InjectionSafe => "injection-safe",
            Self::ContentSafe => "content-safe",
            Self::FullAudit => "full-audit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "injection-safe" => Ok(Self::InjectionSafe),
            "content-safe" => Ok(Self::ContentSafe),
            "full-audit" => Ok(Self::FullAudit),
            other => Err(VcpError::invalid(format!("unknown attestation type: {other}"))),
        }
    }
}

/// Temporal claims for a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Issued at
    pub iat: DateTime<Utc>,
    /// Not before
    pub nbf: DateTime<Utc>,
    /// Expiration
    pub exp: DateTime<Utc>,
    /// Unique bundle id (UUID) for replay prevention
    pub jti: String,
}

/// Token budget constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub token_count: u64,
    pub tokenizer: String,
    pub max_context_share: f64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            token_count: 0,
            tokenizer: "cl100k_base".to_string(),
            max_context_share: 0.25,
        }
    }
}

/// Scope binding for a bundle. Empty lists impose no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_families: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purposes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
}

/// Composition settings carried in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    pub layer: i32,
    pub mode: CompositionMode,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

impl Default for Composition {
    fn default() -> Self {
        Self {
            layer: 2,
            mode: CompositionMode::Extend,
            conflicts_with: Vec::new(),
            requires: Vec::new(),
        }
    }
}

/// Safety review attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAttestation {
    pub auditor: String,
    pub auditor_key_id: String,
    pub reviewed_at: DateTime<Utc>,
    pub attestation_type: AttestationType,
    pub signature: String,
}

/// Bundle issuer information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub id: String,
    pub public_key: String,
    pub key_id: String,
}

/// Core bundle identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub id: String,
    pub version: String,
    pub content_hash: String,
    pub content_encoding: String,
    pub content_format: String,
}

/// Manifest signature block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSignature {
    /// Always `ed25519` in this protocol version
    pub algorithm: String,
    /// `"base64:{b64}"` signature over the canonical manifest
    pub value: String,
    /// Ordered list of signed top-level fields
    pub signed_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signers: Option<Vec<std::collections::BTreeMap<String, String>>>,
}

/// Revocation lookup endpoints carried in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationPointers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crl_uri: Option<String>,
}

/// Format a UTC timestamp in the wire form (`RFC 3339`, `Z` suffix).
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a UTC timestamp from its wire form.
///
/// # Errors
///
/// Returns [`VcpError::Invalid`] when the string is not RFC 3339.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VcpError::invalid(format!("invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_names_are_stable() {
        assert_eq!(VerificationResult::Valid.name(), "VALID");
        assert_eq!(VerificationResult::ReplayDetected.name(), "REPLAY_DETECTED");
        assert!(VerificationResult::Valid.is_valid());
        assert!(!VerificationResult::Expired.is_valid());
    }

    #[test]
    fn categories() {
        assert_eq!(VerificationResult::Revoked.category(), "security");
        assert_eq!(VerificationResult::Expired.category(), "temporal");
        assert_eq!(VerificationResult::FetchFailed.category(), "transient");
        assert_eq!(VerificationResult::ScopeMismatch.category(), "configuration");
    }

    #[test]
    fn timestamp_wire_form() {
        let dt = parse_utc("2026-01-10T12:00:00Z").unwrap();
        assert_eq!(format_utc(dt), "2026-01-10T12:00:00Z");
    }

    #[test]
    fn report_prefix_stops_before_failing_check() {
        let report =
            VerificationReport::failed(VerificationResult::HashMismatch, PipelineCheck::Hash);
        assert_eq!(report.checks_passed(), ["size", "schema"]);

        let report =
            VerificationReport::failed(VerificationResult::SizeExceeded, PipelineCheck::Size);
        assert!(report.checks_passed().is_empty());
    }

    #[test]
    fn report_full_list_on_success_and_post_check_failure() {
        assert_eq!(
            VerificationReport::valid().checks_passed().len(),
            PipelineCheck::ALL.len()
        );
        let aborted =
            VerificationReport::failed_after_checks(VerificationResult::InvalidAttestation);
        assert_eq!(aborted.checks_passed().len(), PipelineCheck::ALL.len());
    }

    #[test]
    fn attestation_type_roundtrip() {
        for raw in ["injection-safe", "content-safe", "full-audit"] {
            assert_eq!(AttestationType::parse(raw).unwrap().as_str(), raw);
        }
        assert!(AttestationType::parse("ad-hoc").is_err());
    }
}
