//! Trust anchors for issuers and auditors
//!
//! A trust anchor authorizes one `(entity_id, key_id)` pair within a
//! validity window. Anchors in `active` or `rotating` state are usable;
//! `retired` and `compromised` anchors never are.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VcpError};
use crate::types::{format_utc, parse_utc};

/// Lifecycle state of a trust anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorState {
    Active,
    Rotating,
    Retired,
    Compromised,
}

impl AnchorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Rotating => "rotating",
            Self::Retired => "retired",
            Self::Compromised => "compromised",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "rotating" => Ok(Self::Rotating),
            "retired" => Ok(Self::Retired),
            "compromised" => Ok(Self::Compromised),
            other => Err(VcpError::invalid(format!("unknown anchor state: {other}"))),
        }
    }
}

/// Role of the principal behind an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorType {
    Issuer,
    Auditor,
}

/// A trusted public key for an issuer or auditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAnchor {
    pub id: String,
    pub key_id: String,
    pub algorithm: String,
    pub public_key: String,
    pub anchor_type: AnchorType,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub state: AnchorState,
}

impl TrustAnchor {
    /// An anchor is usable iff its state is active/rotating and the
    /// instant falls inside its validity window.
    pub fn is_usable(&self, at: DateTime<Utc>) -> bool {
        matches!(self.state, AnchorState::Active | AnchorState::Rotating)
            && self.valid_from <= at
            && at <= self.valid_until
    }
}

/// Configuration of trusted issuers and auditors.
///
/// Bulk-loaded from a JSON blob; mutation is expected to be rare and
/// serialized by the caller.
#[derive(Debug, Clone, Default)]
pub struct TrustConfig {
    issuers: HashMap<String, Vec<TrustAnchor>>,
    auditors: HashMap<String, Vec<TrustAnchor>>,
}

impl TrustConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a usable issuer anchor at time `at`.
    ///
    /// With `key_id = None`, the first usable key for the issuer wins.
    pub fn issuer_key(
        &self,
        issuer_id: &str,
        key_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Option<&TrustAnchor> {
        Self::lookup(&self.issuers, issuer_id, key_id, at)
    }

    /// Resolve a usable auditor anchor at time `at`.
    pub fn auditor_key(
        &self,
        auditor_id: &str,
        key_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Option<&TrustAnchor> {
        Self::lookup(&self.auditors, auditor_id, key_id, at)
    }

    fn lookup<'a>(
        anchors: &'a HashMap<String, Vec<TrustAnchor>>,
        entity_id: &str,
        key_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Option<&'a TrustAnchor> {
        anchors.get(entity_id)?.iter().find(|anchor| {
            key_id.map_or(true, |k| anchor.key_id == k) && anchor.is_usable(at)
        })
    }

    /// Add a trusted issuer key.
    pub fn add_issuer(&mut self, issuer_id: impl Into<String>, anchor: TrustAnchor) {
        self.issuers.entry(issuer_id.into()).or_default().push(anchor);
    }

    /// Add a trusted auditor key.
    pub fn add_auditor(&mut self, auditor_id: impl Into<String>, anchor: TrustAnchor) {
        self.auditors.entry(auditor_id.into()).or_default().push(anchor);
    }

    /// Load from the trust configuration JSON layout:
    ///
    /// ```json
    /// { "trust_anchors": { "<entity_id>": { "type": "issuer",
    ///   "keys": [ { "id", "algorithm", "public_key", "state",
    ///               "valid_from", "valid_until" } ] } } }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Serialization`] or [`VcpError::Invalid`] on a
    /// malformed blob.
    pub fn from_value(data: &Value) -> Result<Self> {
        let mut config = Self::new();
        let anchors = data
            .get("trust_anchors")
            .and_then(Value::as_object)
            .ok_or_else(|| VcpError::serialization("missing object: trust_anchors"))?;

        for (entity_id, entity_data) in anchors {
            let entity_type = entity_data
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("issuer");
            let anchor_type = match entity_type {
                "auditor" => AnchorType::Auditor,
                _ => AnchorType::Issuer,
            };

            let keys = entity_data
                .get("keys")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    VcpError::serialization(format!("missing keys array for {entity_id}"))
                })?;

            for key in keys {
                let anchor = TrustAnchor {
                    id: entity_id.clone(),
                    key_id: field(key, "id")?,
                    algorithm: field(key, "algorithm")?,
                    public_key: field(key, "public_key")?,
                    anchor_type,
                    valid_from: parse_utc(&field(key, "valid_from")?)?,
                    valid_until: parse_utc(&field(key, "valid_until")?)?,
                    state: AnchorState::parse(
                        key.get("state").and_then(Value::as_str).unwrap_or("active"),
                    )?,
                };
                match anchor_type {
                    AnchorType::Auditor => config.add_auditor(entity_id.clone(), anchor),
                    AnchorType::Issuer => config.add_issuer(entity_id.clone(), anchor),
                }
            }
        }

        Ok(config)
    }

    /// Load from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Export to the trust configuration JSON layout.
    pub fn to_value(&self) -> Value {
        let mut anchors = serde_json::Map::new();
        for (entities, type_name) in [(&self.issuers, "issuer"), (&self.auditors, "auditor")] {
            for (entity_id, entity_anchors) in entities {
                let keys: Vec<Value> = entity_anchors
                    .iter()
                    .map(|a| {
                        serde_json::json!({
                            "id": a.key_id,
                            "algorithm": a.algorithm,
                            "public_key": a.public_key,
                            "state": a.state.as_str(),
                            "valid_from": format_utc(a.valid_from),
                            "valid_until": format_utc(a.valid_until),
                        })
                    })
                    .collect();
                anchors.insert(
                    entity_id.clone(),
                    serde_json::json!({ "type": type_name, "keys": keys }),
                );
            }
        }
        serde_json::json!({ "trust_anchors": anchors })
    }
}

fn field(data: &Value, key: &str) -> Result<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VcpError::serialization(format!("missing string field: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(state: AnchorState) -> TrustAnchor {
        TrustAnchor {
            id: "test.example".into(),
            key_id: "key-1".into(),
            algorithm: "ed25519".into(),
            public_key: "ed25519:AAAA".into(),
            anchor_type: AnchorType::Issuer,
            valid_from: parse_utc("2026-01-01T00:00:00Z").unwrap(),
            valid_until: parse_utc("2026-12-31T00:00:00Z").unwrap(),
            state,
        }
    }

    #[test]
    fn usable_states_and_window() {
        let now = parse_utc("2026-06-01T00:00:00Z").unwrap();
        assert!(anchor(AnchorState::Active).is_usable(now));
        assert!(anchor(AnchorState::Rotating).is_usable(now));
        assert!(!anchor(AnchorState::Retired).is_usable(now));
        assert!(!anchor(AnchorState::Compromised).is_usable(now));

        let before = parse_utc("2025-06-01T00:00:00Z").unwrap();
        assert!(!anchor(AnchorState::Active).is_usable(before));
    }

    #[test]
    fn lookup_by_key_id() {
        let mut config = TrustConfig::new();
        config.add_issuer("test.example", anchor(AnchorState::Active));
        let now = parse_utc("2026-06-01T00:00:00Z").unwrap();

        assert!(config.issuer_key("test.example", Some("key-1"), now).is_some());
        assert!(config.issuer_key("test.example", Some("key-2"), now).is_none());
        assert!(config.issuer_key("test.example", None, now).is_some());
        assert!(config.issuer_key("other.example", None, now).is_none());
        assert!(config.auditor_key("test.example", None, now).is_none());
    }

    #[test]
    fn json_roundtrip() {
        let mut config = TrustConfig::new();
        config.add_issuer("issuer.example", anchor(AnchorState::Active));
        let mut auditor = anchor(AnchorState::Rotating);
        auditor.anchor_type = AnchorType::Auditor;
        config.add_auditor("auditor.example", auditor);

        let reloaded = TrustConfig::from_value(&config.to_value()).unwrap();
        let now = parse_utc("2026-06-01T00:00:00Z").unwrap();
        assert!(reloaded.issuer_key("issuer.example", Some("key-1"), now).is_some());
        assert!(reloaded.auditor_key("auditor.example", Some("key-1"), now).is_some());
    }
}
