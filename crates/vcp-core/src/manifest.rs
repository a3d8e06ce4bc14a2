//! Bundle manifest model and wire serialization
//!
//! The manifest's JSON layout is part of the protocol: optional sections
//! are omitted entirely when absent, and the signing path serializes the
//! same layout through [`crate::canonical::canonicalize_manifest`]. The
//! explicit `to_value`/`from_value` pair keeps that layout under control
//! instead of leaning on derive-generated field order.

use serde_json::{json, Map, Value};

use crate::canonical::canonicalize_manifest;
use crate::error::{Result, VcpError};
use crate::types::{
    format_utc, parse_utc, AttestationType, Budget, BundleInfo, Composition, CompositionMode,
    Issuer, ManifestSignature, RevocationPointers, SafetyAttestation, Scope, Timestamps,
};

/// VCP bundle manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub vcp_version: String,
    pub bundle: BundleInfo,
    pub issuer: Issuer,
    pub timestamps: Timestamps,
    pub budget: Budget,
    pub safety_attestation: SafetyAttestation,
    pub signature: ManifestSignature,
    pub scope: Option<Scope>,
    pub composition: Option<Composition>,
    pub revocation: Option<RevocationPointers>,
    pub metadata: Map<String, Value>,
}

impl Manifest {
    /// Serialize to the wire JSON layout.
    pub fn to_value(&self) -> Value {
        let mut result = Map::new();
        result.insert("vcp_version".into(), json!(self.vcp_version));
        result.insert(
            "bundle".into(),
            json!({
                "id": self.bundle.id,
                "version": self.bundle.version,
                "content_hash": self.bundle.content_hash,
                "content_encoding": self.bundle.content_encoding,
                "content_format": self.bundle.content_format,
            }),
        );
        result.insert(
            "issuer".into(),
            json!({
                "id": self.issuer.id,
                "public_key": self.issuer.public_key,
                "key_id": self.issuer.key_id,
            }),
        );
        result.insert(
            "timestamps".into(),
            json!({
                "iat": format_utc(self.timestamps.iat),
                "nbf": format_utc(self.timestamps.nbf),
                "exp": format_utc(self.timestamps.exp),
                "jti": self.timestamps.jti,
            }),
        );
        result.insert(
            "budget".into(),
            json!({
                "token_count": self.budget.token_count,
                "tokenizer": self.budget.tokenizer,
                "max_context_share": self.budget.max_context_share,
            }),
        );
        result.insert(
            "safety_attestation".into(),
            json!({
                "auditor": self.safety_attestation.auditor,
                "auditor_key_id": self.safety_attestation.auditor_key_id,
                "reviewed_at": format_utc(self.safety_attestation.reviewed_at),
                "attestation_type": self.safety_attestation.attestation_type.as_str(),
                "signature": self.safety_attestation.signature,
            }),
        );

        if let Some(scope) = &self.scope {
            let mut s = Map::new();
            for (key, list) in [
                ("model_families", &scope.model_families),
                ("purposes", &scope.purposes),
                ("environments", &scope.environments),
                ("audiences", &scope.audiences),
                ("regions", &scope.regions),
            ] {
                if !list.is_empty() {
                    s.insert(key.into(), json!(list));
                }
            }
            result.insert("scope".into(), Value::Object(s));
        }

        if let Some(composition) = &self.composition {
            result.insert(
                "composition".into(),
                json!({
                    "layer": composition.layer,
                    "mode": composition.mode.as_str(),
                    "conflicts_with": composition.conflicts_with,
                    "requires": composition.requires,
                }),
            );
        }

        if let Some(revocation) = &self.revocation {
            let mut r = Map::new();
            if let Some(check_uri) = &revocation.check_uri {
                r.insert("check_uri".into(), json!(check_uri));
            }
            if let Some(crl_uri) = &revocation.crl_uri {
                r.insert("crl_uri".into(), json!(crl_uri));
            }
            result.insert("revocation".into(), Value::Object(r));
        }

        if !self.metadata.is_empty() {
            result.insert("metadata".into(), Value::Object(self.metadata.clone()));
        }

        let mut sig = Map::new();
        sig.insert("algorithm".into(), json!(self.signature.algorithm));
        sig.insert("value".into(), json!(self.signature.value));
        sig.insert("signed_fields".into(), json!(self.signature.signed_fields));
        if let Some(threshold) = self.signature.threshold {
            sig.insert("threshold".into(), json!(threshold));
        }
        if let Some(signers) = &self.signature.signers {
            sig.insert("signers".into(), json!(signers));
        }
        result.insert("signature".into(), Value::Object(sig));

        Value::Object(result)
    }

    /// Parse a manifest from its wire JSON layout.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Serialization`] for missing or mistyped fields.
    pub fn from_value(data: &Value) -> Result<Self> {
        let bundle_obj = require(data, "bundle")?;
        let bundle = BundleInfo {
            id: require_str(bundle_obj, "id")?,
            version: require_str(bundle_obj, "version")?,
            content_hash: require_str(bundle_obj, "content_hash")?,
            content_encoding: optional_str(bundle_obj, "content_encoding")
                .unwrap_or_else(|| "utf-8".to_string()),
            content_format: optional_str(bundle_obj, "content_format")
                .unwrap_or_else(|| "text/markdown".to_string()),
        };

        let issuer_obj = require(data, "issuer")?;
        let issuer = Issuer {
            id: require_str(issuer_obj, "id")?,
            public_key: require_str(issuer_obj, "public_key")?,
            key_id: require_str(issuer_obj, "key_id")?,
        };

        let ts_obj = require(data, "timestamps")?;
        let timestamps = Timestamps {
            iat: parse_utc(&require_str(ts_obj, "iat")?)?,
            nbf: parse_utc(&require_str(ts_obj, "nbf")?)?,
            exp: parse_utc(&require_str(ts_obj, "exp")?)?,
            jti: require_str(ts_obj, "jti")?,
        };

        let budget_obj = require(data, "budget")?;
        let budget = Budget {
            token_count: budget_obj
                .get("token_count")
                .and_then(Value::as_u64)
                .ok_or_else(|| VcpError::serialization("budget.token_count must be an integer"))?,
            tokenizer: require_str(budget_obj, "tokenizer")?,
            max_context_share: budget_obj
                .get("max_context_share")
                .and_then(Value::as_f64)
                .unwrap_or(0.25),
        };

        let att_obj = require(data, "safety_attestation")?;
        let safety_attestation = SafetyAttestation {
            auditor: require_str(att_obj, "auditor")?,
            auditor_key_id: require_str(att_obj, "auditor_key_id")?,
            reviewed_at: parse_utc(&require_str(att_obj, "reviewed_at")?)?,
            attestation_type: AttestationType::parse(&require_str(att_obj, "attestation_type")?)?,
            signature: require_str(att_obj, "signature")?,
        };

        let sig_obj = require(data, "signature")?;
        let signature = ManifestSignature {
            algorithm: require_str(sig_obj, "algorithm")?,
            value: require_str(sig_obj, "value")?,
            signed_fields: string_list(sig_obj.get("signed_fields")),
            threshold: sig_obj
                .get("threshold")
                .and_then(Value::as_u64)
                .map(|t| t as u32),
            signers: sig_obj.get("signers").and_then(|v| {
                serde_json::from_value::<Vec<std::collections::BTreeMap<String, String>>>(v.clone())
                    .ok()
            }),
        };

        let scope = data.get("scope").map(|s| Scope {
            model_families: string_list(s.get("model_families")),
            purposes: string_list(s.get("purposes")),
            environments: string_list(s.get("environments")),
            audiences: string_list(s.get("audiences")),
            regions: string_list(s.get("regions")),
        });

        let composition = match data.get("composition") {
            Some(c) => Some(Composition {
                layer: c.get("layer").and_then(Value::as_i64).unwrap_or(2) as i32,
                mode: CompositionMode::parse(
                    c.get("mode").and_then(Value::as_str).unwrap_or("extend"),
                )?,
                conflicts_with: string_list(c.get("conflicts_with")),
                requires: string_list(c.get("requires")),
            }),
            None => None,
        };

        let revocation = data.get("revocation").map(|r| RevocationPointers {
            check_uri: optional_str(r, "check_uri"),
            crl_uri: optional_str(r, "crl_uri"),
        });

        let metadata = data
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            vcp_version: require_str(data, "vcp_version")?,
            bundle,
            issuer,
            timestamps,
            budget,
            safety_attestation,
            signature,
            scope,
            composition,
            revocation,
            metadata,
        })
    }

    /// Canonical signing bytes: the wire layout minus the signature field.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonicalize_manifest(&self.to_value())
    }
}

/// VCP bundle: a manifest paired with its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub manifest: Manifest,
    pub content: String,
}

impl Bundle {
    /// Serialize to the top-level wire object `{manifest, content}`.
    pub fn to_value(&self) -> Value {
        json!({
            "manifest": self.manifest.to_value(),
            "content": self.content,
        })
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_value()).map_err(Into::into)
    }

    /// Parse a bundle from its wire object.
    pub fn from_value(data: &Value) -> Result<Self> {
        let manifest = Manifest::from_value(
            data.get("manifest")
                .ok_or_else(|| VcpError::serialization("missing field: manifest"))?,
        )?;
        let content = data
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| VcpError::serialization("missing field: content"))?
            .to_string();
        Ok(Self { manifest, content })
    }

    /// Parse a bundle from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }
}

fn require<'a>(data: &'a Value, key: &str) -> Result<&'a Value> {
    data.get(key)
        .ok_or_else(|| VcpError::serialization(format!("missing field: {key}")))
}

fn require_str(data: &Value, key: &str) -> Result<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VcpError::serialization(format!("missing string field: {key}")))
}

fn optional_str(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_utc;

    fn sample_manifest() -> Manifest {
        Manifest {
            vcp_version: "1.0".into(),
            bundle: BundleInfo {
                id: "creed://test.example/minimal".into(),
                version: "1.0.0".into(),
                content_hash: "sha256:0000".into(),
                content_encoding: "utf-8".into(),
                content_format: "text/markdown".into(),
            },
            issuer: Issuer {
                id: "test.example".into(),
                public_key: "ed25519:AAAA".into(),
                key_id: "key-2026".into(),
            },
            timestamps: Timestamps {
                iat: parse_utc("2026-01-10T12:00:00Z").unwrap(),
                nbf: parse_utc("2026-01-10T12:00:00Z").unwrap(),
                exp: parse_utc("2026-01-17T12:00:00Z").unwrap(),
                jti: "550e8400-e29b-41d4-a716-446655440000".into(),
            },
            budget: Budget {
                token_count: 25,
                ..Budget::default()
            },
            safety_attestation: SafetyAttestation {
                auditor: "auditor.example".into(),
                auditor_key_id: "audit-key-1".into(),
                reviewed_at: parse_utc("2026-01-10T11:00:00Z").unwrap(),
                attestation_type: AttestationType::InjectionSafe,
                signature: "base64:BBBB".into(),
            },
            signature: ManifestSignature {
                algorithm: "ed25519".into(),
                value: "base64:CCCC".into(),
                signed_fields: vec!["vcp_version".into(), "bundle".into()],
                threshold: None,
                signers: None,
            },
            scope: None,
            composition: None,
            revocation: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn wire_roundtrip() {
        let manifest = sample_manifest();
        let value = manifest.to_value();
        let parsed = Manifest::from_value(&value).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn optional_sections_omitted() {
        let value = sample_manifest().to_value();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("scope"));
        assert!(!obj.contains_key("composition"));
        assert!(!obj.contains_key("revocation"));
        assert!(!obj.contains_key("metadata"));
    }

    #[test]
    fn canonical_bytes_exclude_signature() {
        let manifest = sample_manifest();
        let canonical = String::from_utf8(manifest.canonical_bytes().unwrap()).unwrap();
        assert!(!canonical.contains("CCCC"));
        assert!(canonical.contains("creed://test.example/minimal"));
    }

    #[test]
    fn bundle_json_roundtrip() {
        let bundle = Bundle {
            manifest: sample_manifest(),
            content: "# Test\n".into(),
        };
        let json = bundle.to_json().unwrap();
        let parsed = Bundle::from_json(&json).unwrap();
        assert_eq!(parsed, bundle);
    }

    #[test]
    fn missing_fields_are_errors() {
        let err = Manifest::from_value(&serde_json::json!({"vcp_version": "1.0"})).unwrap_err();
        assert!(matches!(err, VcpError::Serialization { .. }));
    }
}
