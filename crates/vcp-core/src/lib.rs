//! # VCP Core - Layer 1: Foundation
//!
//! Single source of truth for the protocol's domain types and the
//! deterministic byte forms everything else signs and hashes.
//!
//! This crate has zero dependencies on other VCP crates. It provides:
//!
//! - The bundle data model: [`Manifest`], [`Bundle`], [`BundleBuilder`]
//! - Canonicalization: [`canonical::canonicalize_content`] for content
//!   hashing and [`canonical::canonicalize_manifest`] for signing
//! - Trust anchors with validity windows: [`trust::TrustConfig`]
//! - Ed25519 wrapper types: [`crypto::ed25519`]
//! - The nine-dimension context value type: [`context::VcpContext`]
//! - The unified error type: [`VcpError`]
//!
//! Verification, composition, adaptation, and identity live in the
//! crates layered above this one.

#![forbid(unsafe_code)]

pub mod builder;
pub mod canonical;
pub mod constants;
pub mod context;
pub mod crypto;
pub mod error;
pub mod manifest;
pub mod trust;
pub mod types;

pub use builder::BundleBuilder;
pub use context::{Constitution, Dimension, VcpContext};
pub use error::{Result, VcpError};
pub use manifest::{Bundle, Manifest};
pub use trust::{TrustAnchor, TrustConfig};
pub use types::{
    AttestationType, Budget, BundleInfo, Composition, CompositionMode, Issuer, ManifestSignature,
    PipelineCheck, RevocationPointers, SafetyAttestation, Scope, Timestamps, VerificationReport,
    VerificationResult,
};
