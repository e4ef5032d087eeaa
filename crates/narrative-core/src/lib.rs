// crates/narrative-core/src/lib.rs
// ============================================================================
// Crate: narrative-core
// Description: The narrative consistency engine's pure core — canonical
//              state, the patch applier, and the consistency gate.
// Purpose: Own the state/event algebra and the rule engine independent of
//          persistence, LLM transport, and HTTP.
// ============================================================================

//! `narrative-core` has no network or filesystem dependency. Everything in
//! this crate is deterministic given its inputs; the only external seam is
//! [`time::Clock`], which callers supply explicitly.

pub mod applier;
pub mod error;
pub mod event;
pub mod gate;
pub mod identifiers;
pub mod interfaces;
pub mod state;
pub mod time;

pub use applier::materialise_referenced_locations;
pub use error::CoreError;
pub use event::Event;
pub use event::EventType;
pub use event::StatePatch;
pub use gate::Action;
pub use gate::RuleViolation;
pub use gate::ValidationResult;
pub use state::CanonicalState;
