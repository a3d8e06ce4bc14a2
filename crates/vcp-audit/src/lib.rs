//! # VCP Audit
//!
//! Append-only, privacy-preserving audit log. Every verification
//! produces one entry; fields that identify users, bundles, issuers, or
//! requests are replaced by truncated SHA-256 digests before they enter
//! the log. `checks_passed` comes from the pipeline's
//! [`VerificationReport`]: the full ordered check list on success, the
//! prefix up to (but not including) the failing check otherwise. The
//! report, not the bare result code, is what identifies the failing
//! check — `INVALID_ATTESTATION` alone is ambiguous between the
//! attestation check, a strict injection scan, and a pre_inject hook
//! abort.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use vcp_core::types::format_utc;
use vcp_core::{Bundle, VerificationReport};

/// Audit log detail levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditLevel {
    Minimal,
    Standard,
    Full,
    Diagnostic,
}

impl AuditLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Full => "full",
            Self::Diagnostic => "diagnostic",
        }
    }
}

/// Privacy hash: `"sha256:" + first 32 hex chars of SHA-256(value)`.
pub fn hash_for_privacy(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    format!("sha256:{}", &hex::encode(digest)[..32])
}

/// One audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id_hash: String,
    pub verification_result: String,
    pub checks_passed: Vec<String>,
    pub bundle_id_hash: String,
    pub content_hash: String,
    pub issuer_hash: String,
    pub version: String,
    /// Truncated manifest signature value
    pub manifest_signature: String,
    pub audit_level: AuditLevel,
    pub request_id_hash: Option<String>,
    pub duration_ms: Option<u64>,
    pub token_count: Option<u64>,
    /// Diagnostic level only
    pub content_preview: Option<String>,
}

impl AuditEntry {
    /// Serialize for export; level-gated fields appear only when set.
    pub fn to_value(&self) -> Value {
        let mut verification = json!({
            "result": self.verification_result,
            "checks_passed": self.checks_passed,
        });
        let mut bundle_ref = json!({
            "id_hash": self.bundle_id_hash,
            "content_hash": self.content_hash,
            "issuer_hash": self.issuer_hash,
            "version": self.version,
        });

        if self.audit_level >= AuditLevel::Full {
            if let Some(duration_ms) = self.duration_ms {
                verification["duration_ms"] = json!(duration_ms);
            }
            if let Some(token_count) = self.token_count {
                bundle_ref["token_count"] = json!(token_count);
            }
        }
        if self.audit_level == AuditLevel::Diagnostic {
            if let Some(preview) = &self.content_preview {
                bundle_ref["content_preview"] = json!(preview);
            }
        }

        let mut result = json!({
            "vcp_audit_version": "1.0",
            "audit_level": self.audit_level.as_str(),
            "timestamp": format_utc(self.timestamp),
            "session_id_hash": self.session_id_hash,
            "verification": verification,
            "bundle_ref": bundle_ref,
            "manifest_signature": self.manifest_signature,
        });
        if let Some(request_id_hash) = &self.request_id_hash {
            result["request_id"] = json!(request_id_hash);
        }
        result
    }
}

/// Privacy-preserving audit logger. Append-only in-memory buffer with
/// optional JSON export.
pub struct AuditLogger {
    level: AuditLevel,
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLogger {
    pub fn new(level: AuditLevel) -> Self {
        Self {
            level,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Record one verification outcome.
    pub fn log_verification(
        &self,
        bundle: &Bundle,
        report: &VerificationReport,
        session_id: &str,
        request_id: Option<&str>,
        duration_ms: Option<u64>,
    ) -> AuditEntry {
        let manifest = &bundle.manifest;

        let mut signature = manifest.signature.value.clone();
        if let Some(stripped) = signature.strip_prefix("base64:") {
            signature = stripped.to_string();
        }
        if signature.len() > 32 {
            signature = format!("{}...", &signature[..32]);
        }

        let entry = AuditEntry {
            timestamp: Utc::now(),
            session_id_hash: hash_for_privacy(session_id),
            verification_result: report.result.name().to_string(),
            checks_passed: report
                .checks_passed()
                .into_iter()
                .map(str::to_string)
                .collect(),
            bundle_id_hash: hash_for_privacy(&manifest.bundle.id),
            content_hash: manifest.bundle.content_hash.clone(),
            issuer_hash: hash_for_privacy(&manifest.issuer.id),
            version: manifest.bundle.version.clone(),
            manifest_signature: signature,
            audit_level: self.level,
            request_id_hash: request_id.map(hash_for_privacy),
            duration_ms: (self.level >= AuditLevel::Full)
                .then_some(duration_ms)
                .flatten(),
            token_count: (self.level >= AuditLevel::Full)
                .then_some(manifest.budget.token_count),
            content_preview: (self.level == AuditLevel::Diagnostic)
                .then(|| bundle.content.chars().take(100).collect()),
        };

        self.entries.lock().push(entry.clone());
        entry
    }

    /// Entries recorded so far, optionally only those after `since`.
    pub fn entries(&self, since: Option<DateTime<Utc>>) -> Vec<AuditEntry> {
        let entries = self.entries.lock();
        match since {
            Some(since) => entries
                .iter()
                .filter(|e| e.timestamp > since)
                .cloned()
                .collect(),
            None => entries.clone(),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Export all entries as a JSON document.
    pub fn export_json(&self) -> Value {
        let entries: Vec<Value> = self.entries.lock().iter().map(AuditEntry::to_value).collect();
        json!({ "entries": entries })
    }
}
