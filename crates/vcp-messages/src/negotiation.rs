//! Hello/Ack capability negotiation
//!
//! The client declares its version and the extensions it supports; the
//! server answers with the active set (the intersection with what it
//! supports) and the rejected remainder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Client hello for protocol negotiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VcpHello {
    pub version: String,
    #[serde(default)]
    pub supported_extensions: Vec<String>,
    #[serde(default)]
    pub capabilities: BTreeMap<String, bool>,
}

/// Server acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VcpAck {
    pub version: String,
    #[serde(default)]
    pub active_extensions: Vec<String>,
    #[serde(default)]
    pub rejected_extensions: Vec<String>,
}

/// Negotiate extensions between client and server.
pub fn negotiate(hello: &VcpHello, server_capabilities: &BTreeMap<String, bool>) -> VcpAck {
    let mut active = Vec::new();
    let mut rejected = Vec::new();

    for extension in &hello.supported_extensions {
        if server_capabilities.get(extension).copied().unwrap_or(false) {
            active.push(extension.clone());
        } else {
            rejected.push(extension.clone());
        }
    }

    VcpAck {
        version: hello.version.clone(),
        active_extensions: active,
        rejected_extensions: rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_is_active_rest_rejected() {
        let hello = VcpHello {
            version: "3.1.0".into(),
            supported_extensions: vec![
                "consensus".into(),
                "relational".into(),
                "quantum".into(),
            ],
            capabilities: BTreeMap::new(),
        };
        let mut server = BTreeMap::new();
        server.insert("consensus".to_string(), true);
        server.insert("relational".to_string(), true);
        server.insert("personal".to_string(), true);

        let ack = negotiate(&hello, &server);
        assert_eq!(ack.version, "3.1.0");
        assert_eq!(ack.active_extensions, vec!["consensus", "relational"]);
        assert_eq!(ack.rejected_extensions, vec!["quantum"]);
    }

    #[test]
    fn disabled_server_capability_rejected() {
        let hello = VcpHello {
            version: "3.1.0".into(),
            supported_extensions: vec!["consensus".into()],
            capabilities: BTreeMap::new(),
        };
        let mut server = BTreeMap::new();
        server.insert("consensus".to_string(), false);

        let ack = negotiate(&hello, &server);
        assert!(ack.active_extensions.is_empty());
        assert_eq!(ack.rejected_extensions, vec!["consensus"]);
    }

    #[test]
    fn serde_roundtrip() {
        let hello = VcpHello {
            version: "3.1.0".into(),
            supported_extensions: vec!["consensus".into()],
            capabilities: BTreeMap::new(),
        };
        let json = serde_json::to_string(&hello).unwrap();
        let parsed: VcpHello = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hello);
    }
}
