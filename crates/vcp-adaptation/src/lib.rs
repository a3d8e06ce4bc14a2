//! # VCP Adaptation
//!
//! Context-aware adaptation: the [`encoder::ContextEncoder`] maps named
//! situational values onto the nine-dimension symbolic encoding, and
//! the [`state::StateTracker`] keeps a bounded history of contexts,
//! classifying each change into a transition severity and firing
//! `on_transition` hooks.
//!
//! The cross-worker persistence alternative is interface-only: the
//! in-memory tracker behind [`store::SessionStateStore`] is
//! authoritative for semantics.

#![forbid(unsafe_code)]

pub mod encoder;
pub mod personal;
pub mod state;
pub mod store;

pub use encoder::ContextEncoder;
pub use personal::{PersonalContext, PersonalDimension, PersonalSignal};
pub use state::{StateTracker, Transition, TransitionSeverity, EMERGENCY_VALUES, MAJOR_DIMENSIONS};
pub use store::{InMemorySessionStore, SessionStateStore};
