//! # VCP Testkit
//!
//! Deterministic fixtures shared across the workspace's test suites:
//! fixed signing keys, a trust configuration that anchors them, and a
//! factory for fully signed bundles with pinned timestamps so
//! signatures are reproducible.

#![forbid(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use vcp_core::crypto::Ed25519SigningKey;
use vcp_core::trust::{AnchorState, AnchorType, TrustAnchor};
use vcp_core::types::{parse_utc, AttestationType};
use vcp_core::{Bundle, BundleBuilder, TrustConfig};

/// Fixture issuer identity.
pub const ISSUER_ID: &str = "test.example";
/// Fixture issuer key id.
pub const ISSUER_KEY_ID: &str = "issuer-key-2026";
/// Fixture auditor identity.
pub const AUDITOR_ID: &str = "auditor.example";
/// Fixture auditor key id.
pub const AUDITOR_KEY_ID: &str = "auditor-key-2026";

/// Default verification instant used by fixtures: inside the validity
/// window of [`signed_bundle`].
pub fn fixed_now() -> DateTime<Utc> {
    at("2026-01-12T00:00:00Z")
}

/// Parse a timestamp literal, panicking on malformed test input.
pub fn at(raw: &str) -> DateTime<Utc> {
    parse_utc(raw).unwrap_or_else(|e| panic!("bad fixture timestamp {raw}: {e}"))
}

/// Deterministic issuer signing key.
pub fn issuer_key() -> Ed25519SigningKey {
    Ed25519SigningKey::from_bytes([0x11; 32])
}

/// Deterministic auditor signing key.
pub fn auditor_key() -> Ed25519SigningKey {
    Ed25519SigningKey::from_bytes([0x22; 32])
}

/// Trust configuration anchoring the fixture issuer and auditor for
/// all of 2026.
pub fn trust_config() -> TrustConfig {
    let mut config = TrustConfig::new();
    config.add_issuer(
        ISSUER_ID,
        TrustAnchor {
            id: ISSUER_ID.to_string(),
            key_id: ISSUER_KEY_ID.to_string(),
            algorithm: "ed25519".to_string(),
            public_key: issuer_key().verifying_key().to_wire(),
            anchor_type: AnchorType::Issuer,
            valid_from: at("2026-01-01T00:00:00Z"),
            valid_until: at("2026-12-31T23:59:59Z"),
            state: AnchorState::Active,
        },
    );
    config.add_auditor(
        AUDITOR_ID,
        TrustAnchor {
            id: AUDITOR_ID.to_string(),
            key_id: AUDITOR_KEY_ID.to_string(),
            algorithm: "ed25519".to_string(),
            public_key: auditor_key().verifying_key().to_wire(),
            anchor_type: AnchorType::Auditor,
            valid_from: at("2026-01-01T00:00:00Z"),
            valid_until: at("2026-12-31T23:59:59Z"),
            state: AnchorState::Active,
        },
    );
    config
}

/// A builder pre-wired to the fixture issuer and auditor, issued at
/// 2026-01-10T12:00:00Z with a 7-day expiry.
pub fn bundle_builder(bundle_id: &str, content: &str) -> BundleBuilder {
    BundleBuilder::new(bundle_id, "1.0.0")
        .content(content)
        .issuer(ISSUER_ID, issuer_key().verifying_key().to_wire(), ISSUER_KEY_ID)
        .auditor(AUDITOR_ID, AUDITOR_KEY_ID, AttestationType::InjectionSafe)
        .issued_at(at("2026-01-10T12:00:00Z"))
        .expires_days(7)
}

/// A complete, correctly signed bundle with the given content.
pub fn signed_bundle(bundle_id: &str, content: &str) -> Bundle {
    bundle_builder(bundle_id, content)
        .build(&issuer_key(), &auditor_key())
        .unwrap_or_else(|e| panic!("fixture bundle failed to build: {e}"))
}

/// The minimal valid bundle from the conformance scenarios, with its
/// fixed jti.
pub fn minimal_bundle() -> Bundle {
    let mut bundle = signed_bundle(
        "creed://test.example/minimal",
        "# Test Constitution\n\n## Article 1: Safety\nAll responses must be safe and helpful.\n",
    );
    bundle.manifest.timestamps.jti = "550e8400-e29b-41d4-a716-446655440000".to_string();
    resign(&mut bundle);
    bundle
}

/// Re-sign a bundle's manifest after a mutation, keeping the fixture
/// issuer key. Tests use this to produce "almost valid" bundles whose
/// only defect is the mutation under test.
pub fn resign(bundle: &mut Bundle) {
    let canonical = bundle
        .manifest
        .canonical_bytes()
        .unwrap_or_else(|e| panic!("fixture manifest failed to canonicalize: {e}"));
    bundle.manifest.signature.value = issuer_key().sign(&canonical).to_wire();
}

/// Shift every temporal claim by the same offset and re-sign.
pub fn shift_validity(bundle: &mut Bundle, offset: Duration) {
    bundle.manifest.timestamps.iat += offset;
    bundle.manifest.timestamps.nbf += offset;
    bundle.manifest.timestamps.exp += offset;
    resign(bundle);
}
