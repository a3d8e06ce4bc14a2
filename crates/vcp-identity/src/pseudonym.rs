//! Pseudonymous identity support
//!
//! Derives unlinkable identities from `(real_identity, secret, salt)`
//! via HMAC-SHA-256 and provides ownership proofs verified in constant
//! time. The salt is stored per pseudonym; the secret never is.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::registry::{LocalRegistry, PrivacyTier, RegistryEntry};
use crate::token::Token;

type HmacSha256 = Hmac<Sha256>;

/// Registry extension for pseudonymous tokens.
pub struct PseudonymousIdentity {
    registry: Arc<LocalRegistry>,
    salts: Mutex<HashMap<String, [u8; 32]>>,
}

impl PseudonymousIdentity {
    pub fn new(registry: Arc<LocalRegistry>) -> Self {
        Self {
            registry,
            salts: Mutex::new(HashMap::new()),
        }
    }

    /// Derive a pseudonymous identity: 32 hex characters of
    /// `HMAC(secret, real_identity ":" salt_hex)` under a fresh salt.
    pub fn generate_pseudonym(&self, real_identity: &str, secret: &[u8]) -> String {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);

        let pseudonym = Self::derive(secret, real_identity, &salt);
        self.salts.lock().insert(pseudonym.clone(), salt);
        pseudonym
    }

    fn derive(secret: &[u8], real_identity: &str, salt: &[u8; 32]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap_or_else(|_| unreachable!());
        mac.update(format!("{real_identity}:{}", hex::encode(salt)).as_bytes());
        hex::encode(mac.finalize().into_bytes())[..32].to_string()
    }

    /// Register a token under a pseudonymous identity.
    pub fn register_pseudonymous(
        &self,
        token: Token,
        pseudonym: &str,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> RegistryEntry {
        self.registry.register(
            token,
            PrivacyTier::Pseudonymous,
            Some(format!("pseudo:{pseudonym}")),
            metadata,
        )
    }

    /// Ownership proof: `HMAC(secret, canonical ":" pseudonym ":" salt_hex)`.
    pub fn prove_ownership(&self, token: &Token, pseudonym: &str, secret: &[u8]) -> Vec<u8> {
        let salt = self
            .salts
            .lock()
            .get(pseudonym)
            .copied()
            .unwrap_or([0u8; 32]);
        let mut mac = HmacSha256::new_from_slice(secret).unwrap_or_else(|_| unreachable!());
        mac.update(
            format!("{}:{pseudonym}:{}", token.canonical(), hex::encode(salt)).as_bytes(),
        );
        mac.finalize().into_bytes().to_vec()
    }

    /// Constant-time verification of an ownership proof.
    pub fn verify_ownership(
        &self,
        token: &Token,
        pseudonym: &str,
        proof: &[u8],
        secret: &[u8],
    ) -> bool {
        let expected = self.prove_ownership(token, pseudonym, secret);
        expected.len() == proof.len() && expected.ct_eq(proof).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> PseudonymousIdentity {
        PseudonymousIdentity::new(Arc::new(LocalRegistry::new()))
    }

    #[test]
    fn pseudonyms_are_unlinkable_and_fresh() {
        let identity = setup();
        let a = identity.generate_pseudonym("alice@example.com", b"secret");
        let b = identity.generate_pseudonym("alice@example.com", b"secret");
        assert_eq!(a.len(), 32);
        assert_ne!(a, b, "fresh salt must produce distinct pseudonyms");
    }

    #[test]
    fn ownership_proof_roundtrip() {
        let identity = setup();
        let pseudonym = identity.generate_pseudonym("alice@example.com", b"secret");
        let token = Token::parse("pseudo.writing.journal").unwrap();
        identity.register_pseudonymous(token.clone(), &pseudonym, None);

        let proof = identity.prove_ownership(&token, &pseudonym, b"secret");
        assert!(identity.verify_ownership(&token, &pseudonym, &proof, b"secret"));
        assert!(!identity.verify_ownership(&token, &pseudonym, &proof, b"wrong"));
        assert!(!identity.verify_ownership(&token, &pseudonym, b"garbage", b"secret"));
    }

    #[test]
    fn registered_entry_is_pseudonymous_tier() {
        let identity = setup();
        let pseudonym = identity.generate_pseudonym("bob", b"s");
        let token = Token::parse("anon.deep.thoughts").unwrap();
        let entry = identity.register_pseudonymous(token, &pseudonym, None);
        assert_eq!(entry.privacy_tier, PrivacyTier::Pseudonymous);
        assert_eq!(entry.owner_id, Some(format!("pseudo:{pseudonym}")));
    }
}
