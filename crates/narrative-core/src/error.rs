// crates/narrative-core/src/error.rs
// ============================================================================
// Module: Narrative Core Errors
// Description: Error taxonomy for state construction, event construction,
//              and rule evaluation.
// Purpose: Separate programmer/invariant errors from gate outcomes.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Rule outcomes (PASS / AUTO_FIX / REWRITE / ASK_USER) are never expressed
//! as errors — they are structured [`crate::gate::ValidationResult`] values.
//! `CoreError` exists only for invariant violations, malformed construction
//! inputs, and identifier collisions: the things that indicate a bug in the
//! caller or the extractor, not a disagreement about story content.

use thiserror::Error;

/// Errors raised while constructing or validating canonical state and events.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A referential-integrity invariant does not hold.
    #[error("referential integrity violation: {0}")]
    InvariantViolation(String),
    /// An update or patch referenced an entity that does not and cannot exist.
    #[error("unknown {kind} entity: {id}")]
    UnknownEntity {
        /// Entity kind (`character`, `item`, `location`, `faction`, `quest`).
        kind: &'static str,
        /// Entity identifier that could not be resolved.
        id: String,
    },
    /// An event failed structural validation at construction time.
    #[error("malformed event: {reason}")]
    MalformedEvent {
        /// Human-readable reason for rejection.
        reason: String,
    },
    /// An event's `state_patch` had no non-empty effect (the traceability invariant).
    #[error("event has no effects; state_patch must change at least one field")]
    EmptyEffects,
    /// Two events claimed the same `event_id`.
    #[error("duplicate event_id: {0}")]
    DuplicateEventId(String),
}
