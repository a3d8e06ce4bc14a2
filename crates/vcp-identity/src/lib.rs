//! # VCP Identity
//!
//! The VCP/I naming layer: dot-separated [`Token`]s with ABNF-validated
//! segments, namespace tier governance, privacy-tier inference, and the
//! privacy-preserving local [`registry::LocalRegistry`] (prefix tree +
//! Bloom filter, authorization-scoped wildcard queries, subscriptions).
//!
//! Exact lookups are always allowed and reveal nothing about siblings;
//! enumeration of non-public tiers requires authorization for the
//! queried prefix.

#![forbid(unsafe_code)]

pub mod namespace;
pub mod pseudonym;
pub mod registry;
pub mod token;

pub use namespace::{infer_tier, is_core_domain, NamespaceTier};
pub use pseudonym::PseudonymousIdentity;
pub use registry::{
    infer_privacy_tier, AuthorizationContext, LocalRegistry, PrivacyTier, QueryResult,
    RegistryEntry,
};
pub use token::Token;
