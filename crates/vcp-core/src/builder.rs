//! Fluent construction of signed bundles

use chrono::{DateTime, Duration, Utc};
use serde_json::Map;
use uuid::Uuid;

use crate::canonical::{attestation_payload, canonicalize_manifest, compute_content_hash};
use crate::constants::VCP_VERSION;
use crate::crypto::Ed25519SigningKey;
use crate::error::{Result, VcpError};
use crate::manifest::{Bundle, Manifest};
use crate::types::{
    format_utc, AttestationType, Budget, BundleInfo, Composition, Issuer, ManifestSignature,
    RevocationPointers, SafetyAttestation, Scope, Timestamps,
};

/// Builder for creating signed VCP bundles.
///
/// The attestation is signed first (over the attestation payload), then
/// the manifest signature is computed over the canonical manifest with an
/// empty signature value in place.
pub struct BundleBuilder {
    bundle_id: String,
    version: String,
    content: Option<String>,
    issuer_id: Option<String>,
    issuer_public_key: Option<String>,
    issuer_key_id: Option<String>,
    auditor: Option<String>,
    auditor_key_id: Option<String>,
    attestation_type: AttestationType,
    tokenizer: String,
    max_context_share: f64,
    token_count: Option<u64>,
    scope: Option<Scope>,
    composition: Option<Composition>,
    revocation: Option<RevocationPointers>,
    metadata: Map<String, serde_json::Value>,
    expires_days: i64,
    issued_at: Option<DateTime<Utc>>,
}

impl BundleBuilder {
    pub fn new(bundle_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            version: version.into(),
            content: None,
            issuer_id: None,
            issuer_public_key: None,
            issuer_key_id: None,
            auditor: None,
            auditor_key_id: None,
            attestation_type: AttestationType::InjectionSafe,
            tokenizer: "cl100k_base".to_string(),
            max_context_share: 0.25,
            token_count: None,
            scope: None,
            composition: None,
            revocation: None,
            metadata: Map::new(),
            expires_days: 7,
            issued_at: None,
        }
    }

    /// Set constitution content.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set issuer identity and key material references.
    pub fn issuer(
        mut self,
        issuer_id: impl Into<String>,
        public_key: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        self.issuer_id = Some(issuer_id.into());
        self.issuer_public_key = Some(public_key.into());
        self.issuer_key_id = Some(key_id.into());
        self
    }

    /// Set safety auditor identity.
    pub fn auditor(
        mut self,
        auditor: impl Into<String>,
        key_id: impl Into<String>,
        attestation_type: AttestationType,
    ) -> Self {
        self.auditor = Some(auditor.into());
        self.auditor_key_id = Some(key_id.into());
        self.attestation_type = attestation_type;
        self
    }

    /// Set token budget parameters.
    pub fn budget(mut self, tokenizer: impl Into<String>, max_context_share: f64) -> Self {
        self.tokenizer = tokenizer.into();
        self.max_context_share = max_context_share;
        self
    }

    /// Override the declared token count (default: content length / 4).
    pub fn token_count(mut self, count: u64) -> Self {
        self.token_count = Some(count);
        self
    }

    /// Set scope binding.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Set composition settings.
    pub fn composition(mut self, composition: Composition) -> Self {
        self.composition = Some(composition);
        self
    }

    /// Set revocation URIs.
    pub fn revocation(mut self, check_uri: impl Into<String>, crl_uri: Option<String>) -> Self {
        self.revocation = Some(RevocationPointers {
            check_uri: Some(check_uri.into()),
            crl_uri,
        });
        self
    }

    /// Set custom metadata.
    pub fn metadata(mut self, metadata: Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set expiration in days from issuance.
    pub fn expires_days(mut self, days: i64) -> Self {
        self.expires_days = days;
        self
    }

    /// Pin the issuance instant (defaults to now). Tests pin this so
    /// signatures are reproducible.
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Build the signed bundle.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] when content, issuer, or auditor are
    /// missing, and propagates canonicalization failures.
    pub fn build(
        self,
        issuer_key: &Ed25519SigningKey,
        auditor_key: &Ed25519SigningKey,
    ) -> Result<Bundle> {
        let content = self
            .content
            .ok_or_else(|| VcpError::invalid("content is required"))?;
        let issuer_id = self
            .issuer_id
            .ok_or_else(|| VcpError::invalid("issuer information is required"))?;
        let issuer_public_key = self
            .issuer_public_key
            .ok_or_else(|| VcpError::invalid("issuer information is required"))?;
        let issuer_key_id = self
            .issuer_key_id
            .ok_or_else(|| VcpError::invalid("issuer information is required"))?;
        let auditor = self
            .auditor
            .ok_or_else(|| VcpError::invalid("auditor information is required"))?;
        let auditor_key_id = self
            .auditor_key_id
            .ok_or_else(|| VcpError::invalid("auditor information is required"))?;

        let now = self.issued_at.unwrap_or_else(Utc::now);
        let content_hash = compute_content_hash(&content)?;
        let token_count = self
            .token_count
            .unwrap_or_else(|| (content.len() / 4) as u64);

        let attestation_bytes = attestation_payload(
            &auditor,
            &auditor_key_id,
            &format_utc(now),
            self.attestation_type.as_str(),
            &content_hash,
        );
        let attestation_sig = auditor_key.sign(&attestation_bytes);

        let mut signed_fields = vec![
            "vcp_version".to_string(),
            "bundle".to_string(),
            "issuer".to_string(),
            "timestamps".to_string(),
            "budget".to_string(),
            "safety_attestation".to_string(),
        ];
        if self.scope.is_some() {
            signed_fields.push("scope".to_string());
        }
        if self.composition.is_some() {
            signed_fields.push("composition".to_string());
        }
        if self.revocation.is_some() {
            signed_fields.push("revocation".to_string());
        }
        if !self.metadata.is_empty() {
            signed_fields.push("metadata".to_string());
        }

        let mut manifest = Manifest {
            vcp_version: VCP_VERSION.to_string(),
            bundle: BundleInfo {
                id: self.bundle_id,
                version: self.version,
                content_hash,
                content_encoding: "utf-8".to_string(),
                content_format: "text/markdown".to_string(),
            },
            issuer: Issuer {
                id: issuer_id,
                public_key: issuer_public_key,
                key_id: issuer_key_id,
            },
            timestamps: Timestamps {
                iat: now,
                nbf: now,
                exp: now + Duration::days(self.expires_days),
                jti: Uuid::new_v4().to_string(),
            },
            budget: Budget {
                token_count,
                tokenizer: self.tokenizer,
                max_context_share: self.max_context_share,
            },
            safety_attestation: SafetyAttestation {
                auditor,
                auditor_key_id,
                reviewed_at: now,
                attestation_type: self.attestation_type,
                signature: attestation_sig.to_wire(),
            },
            signature: ManifestSignature {
                algorithm: "ed25519".to_string(),
                value: String::new(),
                signed_fields,
                threshold: None,
                signers: None,
            },
            scope: self.scope,
            composition: self.composition,
            revocation: self.revocation,
            metadata: self.metadata,
        };

        let canonical = canonicalize_manifest(&manifest.to_value())?;
        manifest.signature.value = issuer_key.sign(&canonical).to_wire();

        Ok(Bundle { manifest, content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::verify_content_hash;
    use crate::crypto::{ed25519_verify, Ed25519Signature};
    use crate::types::parse_utc;

    fn build_sample() -> Bundle {
        let issuer_key = Ed25519SigningKey::from_bytes([1u8; 32]);
        let auditor_key = Ed25519SigningKey::from_bytes([2u8; 32]);
        BundleBuilder::new("creed://test.example/minimal", "1.0.0")
            .content("# Test Constitution\n\nBe helpful.\n")
            .issuer(
                "test.example",
                issuer_key.verifying_key().to_wire(),
                "key-2026",
            )
            .auditor("auditor.example", "audit-key-1", AttestationType::InjectionSafe)
            .issued_at(parse_utc("2026-01-10T12:00:00Z").unwrap())
            .build(&issuer_key, &auditor_key)
            .unwrap()
    }

    #[test]
    fn builds_consistent_bundle() {
        let bundle = build_sample();
        assert!(verify_content_hash(
            &bundle.content,
            &bundle.manifest.bundle.content_hash
        ));
        assert_eq!(bundle.manifest.timestamps.iat, bundle.manifest.timestamps.nbf);
        assert_eq!(
            bundle.manifest.timestamps.exp,
            bundle.manifest.timestamps.iat + Duration::days(7)
        );
    }

    #[test]
    fn manifest_signature_verifies() {
        let issuer_key = Ed25519SigningKey::from_bytes([1u8; 32]);
        let bundle = build_sample();
        let canonical = bundle.manifest.canonical_bytes().unwrap();
        let sig = Ed25519Signature::from_wire(&bundle.manifest.signature.value).unwrap();
        assert!(ed25519_verify(&canonical, &sig, &issuer_key.verifying_key()).unwrap());
    }

    #[test]
    fn attestation_signature_verifies() {
        let auditor_key = Ed25519SigningKey::from_bytes([2u8; 32]);
        let bundle = build_sample();
        let att = &bundle.manifest.safety_attestation;
        let payload = attestation_payload(
            &att.auditor,
            &att.auditor_key_id,
            &format_utc(att.reviewed_at),
            att.attestation_type.as_str(),
            &bundle.manifest.bundle.content_hash,
        );
        let sig = Ed25519Signature::from_wire(&att.signature).unwrap();
        assert!(ed25519_verify(&payload, &sig, &auditor_key.verifying_key()).unwrap());
    }

    #[test]
    fn missing_issuer_rejected() {
        let issuer_key = Ed25519SigningKey::from_bytes([1u8; 32]);
        let auditor_key = Ed25519SigningKey::from_bytes([2u8; 32]);
        let err = BundleBuilder::new("creed://x/y", "1.0.0")
            .content("# C\n")
            .build(&issuer_key, &auditor_key)
            .unwrap_err();
        assert!(matches!(err, VcpError::Invalid { .. }));
    }
}
