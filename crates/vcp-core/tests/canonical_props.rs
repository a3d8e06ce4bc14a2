//! Property tests for canonicalization and signing

use proptest::prelude::*;
use vcp_core::canonical::{canonicalize_content, canonicalize_manifest, compute_content_hash};
use vcp_core::crypto::{ed25519_verify, Ed25519SigningKey};

proptest! {
    /// Canonicalization is idempotent: a second application is the
    /// identity on any content that canonicalizes at all.
    #[test]
    fn canonicalization_idempotent(input in "[ -~\t\r\nà-öA-Za-z0-9]{0,400}") {
        if let Ok(once) = canonicalize_content(&input) {
            let twice = canonicalize_content(&once).expect("canonical form must re-canonicalize");
            prop_assert_eq!(once, twice);
        }
    }

    /// Byte-equivalent canonical forms hash identically regardless of
    /// the line endings and trailing whitespace of the source.
    #[test]
    fn hash_invariant_under_line_noise(
        lines in proptest::collection::vec("[ -~]{0,40}", 1..10),
        trailing in 0usize..4,
    ) {
        let body: Vec<String> = lines
            .iter()
            .map(|l| l.trim_end_matches([' ', '\t']).to_string())
            .collect();

        let unix = body.join("\n");
        let mut windows = body.join("\r\n");
        windows.push_str(&"\r\n".repeat(trailing));

        let h1 = compute_content_hash(&unix);
        let h2 = compute_content_hash(&windows);
        prop_assert_eq!(h1.is_ok(), h2.is_ok());
        if let (Ok(h1), Ok(h2)) = (h1, h2) {
            prop_assert_eq!(h1, h2);
        }
    }

    /// Signature round-trip over arbitrary canonical manifests.
    #[test]
    fn manifest_signature_roundtrip(
        seed in any::<[u8; 32]>(),
        bundle_id in "[a-z0-9./:-]{1,60}",
        version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
    ) {
        let manifest = serde_json::json!({
            "vcp_version": "1.0",
            "bundle": {"id": bundle_id, "version": version},
            "signature": {"value": "placeholder"},
        });
        let canonical = canonicalize_manifest(&manifest).expect("object canonicalizes");

        let key = Ed25519SigningKey::from_bytes(seed);
        let signature = key.sign(&canonical);
        prop_assert!(ed25519_verify(&canonical, &signature, &key.verifying_key()).unwrap());

        let mut tampered = canonical.clone();
        if let Some(byte) = tampered.first_mut() {
            *byte ^= 0x01;
            prop_assert!(!ed25519_verify(&tampered, &signature, &key.verifying_key()).unwrap());
        }
    }

    /// The canonical form never carries CR, trailing line whitespace,
    /// or a missing final newline.
    #[test]
    fn canonical_form_shape(input in "[ -~\t\r\n]{0,300}") {
        if let Ok(canonical) = canonicalize_content(&input) {
            prop_assert!(!canonical.contains('\r'));
            prop_assert!(canonical.ends_with('\n'));
            for line in canonical.lines() {
                prop_assert_eq!(line, line.trim_end_matches([' ', '\t']));
            }
        }
    }
}
