//! v1.2 message envelope

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;
use vcp_core::canonical::canonicalize_manifest;
use vcp_core::crypto::{ed25519_verify, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey};
use vcp_core::types::{format_utc, parse_utc};
use vcp_core::Result;

/// Protocol version for v1.2 messages.
pub const PROTOCOL_VERSION: &str = "1.2";

/// Escalation severities that require acknowledgment.
const ACK_REQUIRED_SEVERITIES: [&str; 2] = ["critical", "emergency"];

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .unwrap_or_else(|_| unreachable!())
});

/// The four message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Share context state with peer agents
    ContextShare,
    /// Announce active constitutions
    ConstitutionAnnounce,
    /// Propagate constraints to child agents
    ConstraintPropagate,
    /// Escalate safety concerns to parent agents
    Escalation,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContextShare => "context_share",
            Self::ConstitutionAnnounce => "constitution_announce",
            Self::ConstraintPropagate => "constraint_propagate",
            Self::Escalation => "escalation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "context_share" => Some(Self::ContextShare),
            "constitution_announce" => Some(Self::ConstitutionAnnounce),
            "constraint_propagate" => Some(Self::ConstraintPropagate),
            "escalation" => Some(Self::Escalation),
            _ => None,
        }
    }
}

/// A v1.2 message envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct VcpMessage {
    /// Protocol version; must be "1.2"
    pub vcp_message: String,
    pub message_type: String,
    /// UUID used for deduplication
    pub message_id: String,
    pub sender: String,
    /// Target agent identifier, or "broadcast"
    pub recipient: String,
    /// ISO 8601 UTC creation time
    pub timestamp: String,
    pub payload: Map<String, Value>,
    pub signature: Option<String>,
}

/// Create a message with a generated id and current timestamp.
pub fn create_message(
    message_type: MessageType,
    sender: impl Into<String>,
    recipient: impl Into<String>,
    payload: Map<String, Value>,
) -> VcpMessage {
    VcpMessage {
        vcp_message: PROTOCOL_VERSION.to_string(),
        message_type: message_type.as_str().to_string(),
        message_id: Uuid::new_v4().to_string(),
        sender: sender.into(),
        recipient: recipient.into(),
        timestamp: format_utc(Utc::now()),
        payload,
        signature: None,
    }
}

/// Validate a message against the v1.2 envelope rules.
///
/// Returns all violations; an empty list means the message is valid.
pub fn validate_message(msg: &VcpMessage) -> Vec<String> {
    let mut errors = Vec::new();

    if msg.vcp_message != PROTOCOL_VERSION {
        errors.push(format!(
            "vcp_message must be '{PROTOCOL_VERSION}', got '{}'",
            msg.vcp_message
        ));
    }

    if msg.message_type.is_empty() {
        errors.push("type is required".to_string());
    } else if MessageType::parse(&msg.message_type).is_none() {
        errors.push(format!("unrecognized message type '{}'", msg.message_type));
    }

    if msg.message_id.is_empty() {
        errors.push("message_id is required".to_string());
    } else if !UUID_PATTERN.is_match(&msg.message_id) {
        errors.push(format!("message_id is not a valid UUID: '{}'", msg.message_id));
    }

    if msg.sender.is_empty() {
        errors.push("sender is required".to_string());
    }
    if msg.recipient.is_empty() {
        errors.push("recipient is required".to_string());
    }

    if msg.timestamp.is_empty() {
        errors.push("timestamp is required".to_string());
    } else if parse_utc(&msg.timestamp).is_err() {
        errors.push(format!("timestamp is not valid ISO 8601: '{}'", msg.timestamp));
    }

    if msg.message_type == "escalation" {
        if let Some(severity) = msg.payload.get("severity").and_then(Value::as_str) {
            if ACK_REQUIRED_SEVERITIES.contains(&severity)
                && msg.payload.get("requires_ack") != Some(&Value::Bool(true))
            {
                errors.push(format!("requires_ack must be true for severity '{severity}'"));
            }
        }
    }

    errors
}

/// Serialize to the wire object. The `signature` key is present only
/// when set.
pub fn message_to_value(msg: &VcpMessage) -> Value {
    let mut map = Map::new();
    map.insert("vcp_message".into(), Value::String(msg.vcp_message.clone()));
    map.insert("type".into(), Value::String(msg.message_type.clone()));
    map.insert("message_id".into(), Value::String(msg.message_id.clone()));
    map.insert("sender".into(), Value::String(msg.sender.clone()));
    map.insert("recipient".into(), Value::String(msg.recipient.clone()));
    map.insert("timestamp".into(), Value::String(msg.timestamp.clone()));
    map.insert("payload".into(), Value::Object(msg.payload.clone()));
    if let Some(signature) = &msg.signature {
        map.insert("signature".into(), Value::String(signature.clone()));
    }
    Value::Object(map)
}

/// Parse from the wire object.
///
/// # Errors
///
/// Returns a serialization error for missing required fields.
pub fn message_from_value(data: &Value) -> Result<VcpMessage> {
    let field = |key: &str| -> Result<String> {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| vcp_core::VcpError::serialization(format!("missing field: {key}")))
    };

    Ok(VcpMessage {
        vcp_message: field("vcp_message")?,
        message_type: field("type")?,
        message_id: field("message_id")?,
        sender: field("sender")?,
        recipient: field("recipient")?,
        timestamp: field("timestamp")?,
        payload: data
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        signature: data
            .get("signature")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Sign the envelope: canonical JSON minus `signature`, Ed25519.
///
/// # Errors
///
/// Propagates canonicalization failures.
pub fn sign_message(msg: &VcpMessage, secret_key: &Ed25519SigningKey) -> Result<VcpMessage> {
    let canonical = canonicalize_manifest(&message_to_value(msg))?;
    let signature = secret_key.sign(&canonical);
    let mut signed = msg.clone();
    signed.signature = Some(signature.to_wire());
    Ok(signed)
}

/// Verify an envelope signature. Unsigned messages verify false.
pub fn verify_message(msg: &VcpMessage, public_key: &Ed25519VerifyingKey) -> bool {
    let Some(signature) = &msg.signature else {
        return false;
    };
    let Ok(signature) = Ed25519Signature::from_wire(signature) else {
        return false;
    };
    let Ok(canonical) = canonicalize_manifest(&message_to_value(msg)) else {
        return false;
    };
    ed25519_verify(&canonical, &signature, public_key).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn created_message_is_valid() {
        let msg = create_message(
            MessageType::ContextShare,
            "agent://parent",
            "broadcast",
            payload(&[("context", json!("⏰🌅"))]),
        );
        assert!(validate_message(&msg).is_empty());
    }

    #[test]
    fn version_and_type_enforced() {
        let mut msg = create_message(MessageType::ContextShare, "a", "b", Map::new());
        msg.vcp_message = "1.0".into();
        msg.message_type = "gossip".into();
        let errors = validate_message(&msg);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn uuid_and_timestamp_checked() {
        let mut msg = create_message(MessageType::ContextShare, "a", "b", Map::new());
        msg.message_id = "not-a-uuid".into();
        msg.timestamp = "yesterday".into();
        let errors = validate_message(&msg);
        assert!(errors.iter().any(|e| e.contains("UUID")));
        assert!(errors.iter().any(|e| e.contains("ISO 8601")));
    }

    #[test]
    fn empty_sender_recipient_rejected() {
        let mut msg = create_message(MessageType::Escalation, "", "", Map::new());
        msg.sender = String::new();
        let errors = validate_message(&msg);
        assert!(errors.iter().any(|e| e.contains("sender")));
        assert!(errors.iter().any(|e| e.contains("recipient")));
    }

    #[test]
    fn critical_escalation_requires_ack() {
        let msg = create_message(
            MessageType::Escalation,
            "child",
            "parent",
            payload(&[("severity", json!("critical"))]),
        );
        assert!(validate_message(&msg)
            .iter()
            .any(|e| e.contains("requires_ack")));

        let acked = create_message(
            MessageType::Escalation,
            "child",
            "parent",
            payload(&[("severity", json!("critical")), ("requires_ack", json!(true))]),
        );
        assert!(validate_message(&acked).is_empty());

        let info = create_message(
            MessageType::Escalation,
            "child",
            "parent",
            payload(&[("severity", json!("info"))]),
        );
        assert!(validate_message(&info).is_empty());
    }

    #[test]
    fn wire_roundtrip() {
        let msg = create_message(
            MessageType::ConstraintPropagate,
            "agent://parent",
            "agent://child",
            payload(&[("constraints", json!(["no-external-calls"]))]),
        );
        let parsed = message_from_value(&message_to_value(&msg)).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let key = Ed25519SigningKey::from_bytes([9u8; 32]);
        let msg = create_message(
            MessageType::ConstitutionAnnounce,
            "agent://a",
            "agent://b",
            payload(&[("bundle_id", json!("creed://x/y"))]),
        );

        let signed = sign_message(&msg, &key).unwrap();
        assert!(signed.signature.as_deref().unwrap().starts_with("base64:"));
        assert!(verify_message(&signed, &key.verifying_key()));

        // Unsigned and tampered messages fail
        assert!(!verify_message(&msg, &key.verifying_key()));
        let mut tampered = signed.clone();
        tampered.sender = "agent://evil".into();
        assert!(!verify_message(&tampered, &key.verifying_key()));

        let other_key = Ed25519SigningKey::from_bytes([10u8; 32]);
        assert!(!verify_message(&signed, &other_key.verifying_key()));
    }
}
