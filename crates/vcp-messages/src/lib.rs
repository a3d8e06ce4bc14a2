//! # VCP Messages
//!
//! The v1.2 inter-agent message envelope and the Hello/Ack capability
//! negotiation. Envelope signing reuses the manifest canonicalization
//! scheme: the canonical JSON of the envelope minus its `signature`
//! field, signed with Ed25519.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod negotiation;

pub use envelope::{
    create_message, sign_message, validate_message, verify_message, MessageType, VcpMessage,
    PROTOCOL_VERSION,
};
pub use negotiation::{negotiate, VcpAck, VcpHello};
