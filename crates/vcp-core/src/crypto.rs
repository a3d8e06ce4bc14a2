//! Ed25519 signature types and wire-format helpers

use base64::Engine;
use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};

use crate::constants::{PUBLIC_KEY_PREFIX, SIGNATURE_PREFIX};
use crate::error::{Result, VcpError};

/// Ed25519 signature wrapper (bytes form for serialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Try to construct from a slice.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| VcpError::crypto("Ed25519 signature must be exactly 64 bytes"))?;
        Ok(Self(arr))
    }

    /// Encode to the `"base64:{b64}"` wire form.
    pub fn to_wire(&self) -> String {
        format!(
            "{SIGNATURE_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(self.0)
        )
    }

    /// Decode from the `"base64:{b64}"` wire form (bare base64 accepted).
    pub fn from_wire(value: &str) -> Result<Self> {
        let b64 = value.strip_prefix(SIGNATURE_PREFIX).unwrap_or(value);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| VcpError::crypto(format!("invalid signature encoding: {e}")))?;
        Self::try_from_slice(&bytes)
    }
}

/// Ed25519 signing key wrapper.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519SigningKey(pub [u8; 32]);

impl std::fmt::Debug for Ed25519SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret key material
        f.write_str("Ed25519SigningKey(..)")
    }
}

impl Ed25519SigningKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VcpError::crypto("Ed25519 signing key must be exactly 32 bytes"))?;
        Ok(Self(arr))
    }

    pub fn verifying_key(&self) -> Ed25519VerifyingKey {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        Ed25519VerifyingKey(key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        Ed25519Signature(key.sign(message).to_bytes())
    }
}

/// Ed25519 verifying key wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519VerifyingKey(pub [u8; 32]);

impl Ed25519VerifyingKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(|_| Self(bytes))
            .map_err(|e| VcpError::crypto(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VcpError::crypto("invalid public key length"))?;
        Self::from_bytes(arr)
    }

    /// Encode to the `"ed25519:{b64}"` wire form.
    pub fn to_wire(&self) -> String {
        format!(
            "{PUBLIC_KEY_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(self.0)
        )
    }

    /// Decode from the `"ed25519:{b64}"` wire form (bare base64 accepted).
    pub fn from_wire(value: &str) -> Result<Self> {
        let b64 = value.strip_prefix(PUBLIC_KEY_PREFIX).unwrap_or(value);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| VcpError::crypto(format!("invalid public key encoding: {e}")))?;
        Self::try_from_slice(&bytes)
    }
}

/// Verify an Ed25519 signature using dalek's strict verification.
pub fn ed25519_verify(
    message: &[u8],
    signature: &Ed25519Signature,
    public_key: &Ed25519VerifyingKey,
) -> Result<bool> {
    let pk = ed25519_dalek::VerifyingKey::from_bytes(&public_key.0)
        .map_err(|e| VcpError::crypto(e.to_string()))?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    Ok(pk.verify_strict(message, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lengths_rejected() {
        assert!(Ed25519Signature::try_from_slice(&[0u8; 63]).is_err());
        assert!(Ed25519SigningKey::try_from_slice(&[0u8; 31]).is_err());
        assert!(Ed25519VerifyingKey::try_from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let sk = Ed25519SigningKey::from_bytes([7u8; 32]);
        let message = b"vcp-manifest-bytes";
        let sig = sk.sign(message);
        assert!(ed25519_verify(message, &sig, &sk.verifying_key()).unwrap());
        assert!(!ed25519_verify(b"other", &sig, &sk.verifying_key()).unwrap());
    }

    #[test]
    fn wire_forms_roundtrip() {
        let sk = Ed25519SigningKey::from_bytes([11u8; 32]);
        let pk = sk.verifying_key();
        let sig = sk.sign(b"msg");

        let pk_wire = pk.to_wire();
        assert!(pk_wire.starts_with("ed25519:"));
        assert_eq!(Ed25519VerifyingKey::from_wire(&pk_wire).unwrap(), pk);

        let sig_wire = sig.to_wire();
        assert!(sig_wire.starts_with("base64:"));
        assert_eq!(Ed25519Signature::from_wire(&sig_wire).unwrap(), sig);
    }
}
