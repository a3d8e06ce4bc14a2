//! Orchestrator: the ordered verification pipeline
//!
//! `verify` runs the checks in the documented order and terminates at
//! the first failure with that failure's result code. No hook fires for
//! a bundle that fails an earlier check. All checks are fail-closed
//! except revocation transport (handled inside the checker) and hook
//! execution.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use vcp_core::canonical::{attestation_payload, canonicalize_content};
use vcp_core::constants::{CLOCK_SKEW_MINUTES, MAX_CONTENT_SIZE, MAX_EXP_DAYS, MAX_MANIFEST_SIZE};
use vcp_core::crypto::{ed25519_verify, Ed25519Signature, Ed25519VerifyingKey};
use vcp_core::types::format_utc;
use vcp_core::{
    Bundle, PipelineCheck, Result, TrustConfig, VcpError, VerificationReport, VerificationResult,
};
use vcp_hooks::{ChainStatus, HookEvent, HookExecutor, HookType};

use crate::replay::ReplayCache;
use crate::revocation::RevocationChecker;
use crate::scan::scan_for_injection;

/// Per-call verification parameters.
#[derive(Debug, Clone)]
pub struct VerificationContext {
    /// Model context window used for the budget check
    pub model_context_limit: u64,
    /// Runtime model family matched against scope globs
    pub model_family: String,
    pub purpose: String,
    pub environment: String,
    /// Session used for hook chain resolution
    pub session_id: String,
    /// When set, the manifest's bundle id must match exactly
    pub expected_bundle_id: Option<String>,
    /// When set, injection-scan findings fail verification even with an
    /// attestation present
    pub strict_injection_scan: bool,
    /// Verification instant; `None` means now
    pub at: Option<DateTime<Utc>>,
}

impl Default for VerificationContext {
    fn default() -> Self {
        Self {
            model_context_limit: 128_000,
            model_family: "claude-4".to_string(),
            purpose: "general-assistant".to_string(),
            environment: "production".to_string(),
            session_id: "default".to_string(),
            expected_bundle_id: None,
            strict_injection_scan: false,
            at: None,
        }
    }
}

/// Verifies constitutional bundles against trust anchors, temporal
/// bounds, replay state, budget, scope, and content safety.
pub struct Orchestrator {
    trust_config: TrustConfig,
    replay_cache: Arc<ReplayCache>,
    revocation_checker: Option<Arc<RevocationChecker>>,
    hook_executor: Option<Arc<HookExecutor>>,
}

impl Orchestrator {
    pub fn new(trust_config: TrustConfig) -> Self {
        Self {
            trust_config,
            replay_cache: Arc::new(ReplayCache::new()),
            revocation_checker: None,
            hook_executor: None,
        }
    }

    /// Share a replay cache across orchestrators.
    pub fn with_replay_cache(mut self, cache: Arc<ReplayCache>) -> Self {
        self.replay_cache = cache;
        self
    }

    /// Enable revocation checking.
    pub fn with_revocation_checker(mut self, checker: Arc<RevocationChecker>) -> Self {
        self.revocation_checker = Some(checker);
        self
    }

    /// Enable pre_inject hook execution.
    pub fn with_hook_executor(mut self, executor: Arc<HookExecutor>) -> Self {
        self.hook_executor = Some(executor);
        self
    }

    pub fn replay_cache(&self) -> &ReplayCache {
        &self.replay_cache
    }

    /// Verify a bundle, returning the terminal result code.
    pub fn verify(&self, bundle: &Bundle, context: &VerificationContext) -> VerificationResult {
        self.verify_report(bundle, context).result
    }

    /// Verify a bundle, returning the result code paired with the
    /// check it failed at. The report is what the audit log consumes:
    /// a result code such as `INVALID_ATTESTATION` alone does not say
    /// whether the attestation check, the strict injection scan, or a
    /// pre_inject hook abort produced it.
    pub fn verify_report(
        &self,
        bundle: &Bundle,
        context: &VerificationContext,
    ) -> VerificationReport {
        let manifest = &bundle.manifest;
        let now = context.at.unwrap_or_else(Utc::now);

        // 1. Size limits, before any hashing
        let manifest_json = match serde_json::to_string(&manifest.to_value()) {
            Ok(json) => json,
            Err(_) => {
                return VerificationReport::failed(
                    VerificationResult::InvalidSchema,
                    PipelineCheck::Schema,
                )
            }
        };
        if manifest_json.len() > MAX_MANIFEST_SIZE {
            return VerificationReport::failed(
                VerificationResult::SizeExceeded,
                PipelineCheck::Size,
            );
        }
        if bundle.content.len() > MAX_CONTENT_SIZE {
            return VerificationReport::failed(
                VerificationResult::SizeExceeded,
                PipelineCheck::Size,
            );
        }
        let canonical_content = match canonicalize_content(&bundle.content) {
            Ok(canonical) => canonical,
            Err(err) => {
                debug!(error = %err, "content canonicalization failed");
                return VerificationReport::failed(
                    VerificationResult::InvalidSchema,
                    PipelineCheck::Schema,
                );
            }
        };
        if canonical_content.len() > MAX_CONTENT_SIZE {
            return VerificationReport::failed(
                VerificationResult::SizeExceeded,
                PipelineCheck::Size,
            );
        }

        // 2. Content hash binding
        let digest = <sha2::Sha256 as sha2::Digest>::digest(canonical_content.as_bytes());
        let computed = format!("sha256:{}", hex::encode(digest));
        if computed != manifest.bundle.content_hash {
            return VerificationReport::failed(
                VerificationResult::HashMismatch,
                PipelineCheck::Hash,
            );
        }

        // 3. Issuer trust
        let Some(issuer_key) =
            self.trust_config
                .issuer_key(&manifest.issuer.id, Some(&manifest.issuer.key_id), now)
        else {
            return VerificationReport::failed(
                VerificationResult::UntrustedIssuer,
                PipelineCheck::Issuer,
            );
        };

        // 4. Manifest signature
        let canonical_manifest = match manifest.canonical_bytes() {
            Ok(bytes) => bytes,
            Err(_) => {
                return VerificationReport::failed(
                    VerificationResult::InvalidSchema,
                    PipelineCheck::Schema,
                )
            }
        };
        let verified = Ed25519Signature::from_wire(&manifest.signature.value)
            .and_then(|sig| {
                let key = Ed25519VerifyingKey::from_wire(&issuer_key.public_key)?;
                ed25519_verify(&canonical_manifest, &sig, &key)
            })
            .unwrap_or(false);
        if !verified {
            return VerificationReport::failed(
                VerificationResult::InvalidSignature,
                PipelineCheck::Signature,
            );
        }

        // 5. Auditor trust
        let attestation = &manifest.safety_attestation;
        let Some(auditor_key) = self.trust_config.auditor_key(
            &attestation.auditor,
            Some(&attestation.auditor_key_id),
            now,
        ) else {
            return VerificationReport::failed(
                VerificationResult::UntrustedAuditor,
                PipelineCheck::Auditor,
            );
        };

        // 6. Attestation signature
        let payload = attestation_payload(
            &attestation.auditor,
            &attestation.auditor_key_id,
            &format_utc(attestation.reviewed_at),
            attestation.attestation_type.as_str(),
            &manifest.bundle.content_hash,
        );
        let attested = Ed25519Signature::from_wire(&attestation.signature)
            .and_then(|sig| {
                let key = Ed25519VerifyingKey::from_wire(&auditor_key.public_key)?;
                ed25519_verify(&payload, &sig, &key)
            })
            .unwrap_or(false);
        if !attested {
            return VerificationReport::failed(
                VerificationResult::InvalidAttestation,
                PipelineCheck::Attestation,
            );
        }

        // 7. Revocation (fail-open on transport, fail-closed on revoked)
        if let Some(checker) = &self.revocation_checker {
            if manifest.revocation.is_some() {
                let status = checker.check(manifest);
                if status.revoked {
                    return VerificationReport::failed(
                        VerificationResult::Revoked,
                        PipelineCheck::Revocation,
                    );
                }
            }
        }

        // 8. Temporal claims
        let ts = &manifest.timestamps;
        if now < ts.nbf {
            return VerificationReport::failed(
                VerificationResult::NotYetValid,
                PipelineCheck::Temporal,
            );
        }
        if now > ts.exp {
            return VerificationReport::failed(VerificationResult::Expired, PipelineCheck::Temporal);
        }
        if ts.iat > now + Duration::minutes(CLOCK_SKEW_MINUTES) {
            return VerificationReport::failed(
                VerificationResult::FutureTimestamp,
                PipelineCheck::Temporal,
            );
        }
        if ts.exp > ts.iat + Duration::days(MAX_EXP_DAYS) {
            return VerificationReport::failed(VerificationResult::Expired, PipelineCheck::Temporal);
        }

        // 9. Replay prevention
        if !self.replay_cache.admit(&ts.jti, ts.exp, now) {
            return VerificationReport::failed(
                VerificationResult::ReplayDetected,
                PipelineCheck::Replay,
            );
        }

        // 10. Expected token binding
        if let Some(expected) = &context.expected_bundle_id {
            if expected != &manifest.bundle.id {
                return VerificationReport::failed(
                    VerificationResult::TokenMismatch,
                    PipelineCheck::Token,
                );
            }
        }

        // 11. Token budget
        let max_tokens =
            (context.model_context_limit as f64 * manifest.budget.max_context_share) as u64;
        if manifest.budget.token_count > max_tokens {
            return VerificationReport::failed(
                VerificationResult::BudgetExceeded,
                PipelineCheck::Budget,
            );
        }

        // 12. Scope binding
        if let Some(scope) = &manifest.scope {
            if !scope.model_families.is_empty() {
                let matched = scope.model_families.iter().any(|pattern| {
                    glob::Pattern::new(pattern)
                        .map(|p| p.matches(&context.model_family))
                        .unwrap_or(false)
                });
                if !matched {
                    return VerificationReport::failed(
                        VerificationResult::ScopeMismatch,
                        PipelineCheck::Scope,
                    );
                }
            }
            if !scope.purposes.is_empty() && !scope.purposes.contains(&context.purpose) {
                return VerificationReport::failed(
                    VerificationResult::ScopeMismatch,
                    PipelineCheck::Scope,
                );
            }
            if !scope.environments.is_empty()
                && !scope.environments.contains(&context.environment)
            {
                return VerificationReport::failed(
                    VerificationResult::ScopeMismatch,
                    PipelineCheck::Scope,
                );
            }
        }

        // 13. Injection scan
        let findings = scan_for_injection(&bundle.content);
        if !findings.is_empty() {
            warn!(
                bundle_id = %manifest.bundle.id,
                findings = findings.len(),
                "injection scan findings"
            );
            if context.strict_injection_scan {
                return VerificationReport::failed(
                    VerificationResult::InvalidAttestation,
                    PipelineCheck::Scan,
                );
            }
        }

        // 14. pre_inject hook chain (fail-open on executor trouble)
        if let Some(executor) = &self.hook_executor {
            let scope_environments = manifest
                .scope
                .as_ref()
                .map(|s| s.environments.clone())
                .unwrap_or_default();
            let event = HookEvent::PreInject {
                injection_target: "system_prompt".to_string(),
                injection_format: "header-delimited".to_string(),
                raw_constitution: bundle.content.clone(),
                scope_environments,
            };
            let mut session = std::collections::BTreeMap::new();
            session.insert(
                "environment".to_string(),
                serde_json::Value::String(context.environment.clone()),
            );
            session.insert(
                "id".to_string(),
                serde_json::Value::String(context.session_id.clone()),
            );

            let chain = executor.execute(
                HookType::PreInject,
                &context.session_id,
                None,
                None,
                event,
                Some(session),
            );
            if chain.status == ChainStatus::Aborted {
                warn!(
                    bundle_id = %manifest.bundle.id,
                    aborted_by = chain.aborted_by.as_deref().unwrap_or("unknown"),
                    reason = chain.reason.as_deref().unwrap_or(""),
                    "pre_inject hook aborted injection"
                );
                // Every named check passed; the abort happened after them
                return VerificationReport::failed_after_checks(
                    VerificationResult::InvalidAttestation,
                );
            }
        }

        VerificationReport::valid()
    }

    /// Verify a bundle, converting any non-valid outcome to an error.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Verification`] carrying the result code name.
    pub fn verify_or_raise(&self, bundle: &Bundle, context: &VerificationContext) -> Result<()> {
        let result = self.verify(bundle, context);
        if result.is_valid() {
            Ok(())
        } else {
            Err(VcpError::verification(result.name()))
        }
    }
}
