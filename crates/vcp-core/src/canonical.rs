//! Deterministic byte forms for hashing and signing
//!
//! Two canonicalizations exist in the protocol and they are not
//! interchangeable: content canonicalization feeds the SHA-256 content
//! hash, manifest canonicalization (JCS-style JSON) feeds the Ed25519
//! manifest signature.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::constants::HASH_PREFIX;
use crate::error::{Result, VcpError};

/// Unicode characters rejected in canonical content: bidirectional
/// overrides, isolates, zero-width characters, and the BOM.
pub const FORBIDDEN_CHARS: [char; 13] = [
    '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}', '\u{202E}', // direction overrides
    '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}', // isolates
    '\u{200B}', '\u{200C}', '\u{200D}', // zero-width
    '\u{FEFF}', // BOM
];

/// Canonicalize constitution content for hash computation.
///
/// Rules:
/// 1. Unicode NFC normalization
/// 2. Line ending normalization (CRLF/CR to LF)
/// 3. Strip trailing spaces and tabs from each line
/// 4. Remove trailing empty lines, ensure a single trailing newline
/// 5. Reject C0 control characters other than LF and TAB
/// 6. Reject forbidden Unicode characters (bidi overrides, zero-width)
///
/// The result is UTF-8 without BOM, ready for SHA-256.
///
/// # Errors
///
/// Returns [`VcpError::Canonical`] when the content contains an illegal
/// control character or a forbidden Unicode character.
pub fn canonicalize_content(text: &str) -> Result<String> {
    let text: String = text.nfc().collect();
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect();
    while lines.last() == Some(&"") {
        lines.pop();
    }
    let mut canonical = lines.join("\n");
    canonical.push('\n');

    for (i, ch) in canonical.char_indices() {
        if ch.is_control() && ch != '\n' && ch != '\t' {
            return Err(VcpError::canonical(format!(
                "illegal control character at position {i}: U+{:04X}",
                ch as u32
            )));
        }
        if FORBIDDEN_CHARS.contains(&ch) {
            return Err(VcpError::canonical(format!(
                "forbidden Unicode character at position {i}: U+{:04X}",
                ch as u32
            )));
        }
    }

    Ok(canonical)
}

/// Canonicalize a manifest for signature computation.
///
/// Implements the JCS-style canonical form: the `signature` field is
/// removed, object keys are serialized in sorted order, there is no
/// insignificant whitespace, and numbers take their shortest form.
/// `serde_json`'s default map is ordered, so serializing the stripped
/// value directly yields the canonical bytes.
///
/// # Errors
///
/// Returns [`VcpError::Serialization`] if the value is not a JSON object.
pub fn canonicalize_manifest(manifest: &serde_json::Value) -> Result<Vec<u8>> {
    let mut to_sign = manifest
        .as_object()
        .cloned()
        .ok_or_else(|| VcpError::serialization("manifest must be a JSON object"))?;
    to_sign.remove("signature");

    let canonical = serde_json::to_string(&serde_json::Value::Object(to_sign))?;
    Ok(canonical.into_bytes())
}

/// Compute the SHA-256 hash of canonical content.
///
/// Returns the wire form `"sha256:{hex}"` with lowercase hex digits.
///
/// # Errors
///
/// Propagates canonicalization failures.
pub fn compute_content_hash(content: &str) -> Result<String> {
    let canonical = canonicalize_content(content)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{HASH_PREFIX}{}", hex::encode(digest)))
}

/// Verify that content matches an expected hash string.
pub fn verify_content_hash(content: &str, expected_hash: &str) -> bool {
    match compute_content_hash(content) {
        Ok(computed) => computed == expected_hash,
        Err(_) => false,
    }
}

/// Canonical signing payload for a safety attestation.
///
/// Sorted-key compact JSON over the attestation claims and the content
/// hash; the auditor key signs these bytes.
pub fn attestation_payload(
    auditor: &str,
    auditor_key_id: &str,
    reviewed_at: &str,
    attestation_type: &str,
    content_hash: &str,
) -> Vec<u8> {
    let payload = serde_json::json!({
        "attestation_type": attestation_type,
        "auditor": auditor,
        "auditor_key_id": auditor_key_id,
        "content_hash": content_hash,
        "reviewed_at": reviewed_at,
    });
    // Object keys already sorted by the default map ordering
    payload.to_string().into_bytes()
}
