//! # VCP Verify
//!
//! The verification side of the protocol: an ordered pipeline over a
//! bundle that terminates in a [`vcp_core::VerificationResult`], plus
//! the collaborators the pipeline consults (replay cache, revocation
//! checker, injection scanner) and the injection formatter that renders
//! verified bundles for a model's system prompt.
//!
//! Every check is fail-closed except revocation transport errors and
//! hook execution failures, which are the protocol's only fail-open
//! paths.

#![forbid(unsafe_code)]

pub mod inject;
pub mod orchestrator;
pub mod replay;
pub mod revocation;
pub mod scan;

pub use inject::{format_injection, format_multi_injection, InjectionFormat, InjectionOptions};
pub use orchestrator::{Orchestrator, VerificationContext};
pub use replay::ReplayCache;
pub use revocation::{RevocationChecker, RevocationStatus};
