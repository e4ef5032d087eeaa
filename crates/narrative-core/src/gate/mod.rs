// crates/narrative-core/src/gate/mod.rs
// ============================================================================
// Module: Consistency Gate
// Description: Ten-rule validator and action-decision algorithm.
// Purpose: Classify a candidate event batch as PASS / AUTO_FIX / REWRITE /
//          ASK_USER before it is ever persisted.
// Dependencies: crate::{state, event, error, time}
// ============================================================================

//! ## Overview
//! The gate never mutates the real state. It projects the pending batch
//! onto a scratch copy via [`crate::applier::apply_many`], then runs each of
//! the ten rules in [`rules`] over `(current_state, temp_state,
//! pending_events)`. Every rule is a pure function; none of them may fail —
//! a rule whose computation cannot proceed skips gracefully, because a REWRITE loop caused by the gate itself would be
//! worse than a missed violation.

pub mod rules;

use crate::event::Event;
use crate::event::EntityUpdate;
use crate::state::CanonicalState;
use crate::time::Clock;

// ============================================================================
// SECTION: Violation Taxonomy
// ============================================================================

/// Which of the ten rules produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum RuleId {
    /// Unique-item single ownership.
    R1,
    /// Item position / owner coherence.
    R2,
    /// Dead characters cannot act.
    R3,
    /// Life/state changes require explicit event type.
    R4,
    /// Location changes require TRAVEL.
    R5,
    /// Single location per character at a time.
    R6,
    /// Monotonic timeline.
    R7,
    /// Immutable constraints hold.
    R8,
    /// Relationship changes are traceable.
    R9,
    /// Draft fidelity (text-cue heuristic).
    R10,
}

impl RuleId {
    /// Human-readable rule name, used in [`RuleViolation::message`] contexts
    /// and in rewrite instructions.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::R1 => "unique_item_single_ownership",
            Self::R2 => "item_position_owner_coherence",
            Self::R3 => "dead_characters_cannot_act",
            Self::R4 => "explicit_event_type_for_life_state_changes",
            Self::R5 => "location_changes_require_travel",
            Self::R6 => "single_location_per_character",
            Self::R7 => "monotonic_timeline",
            Self::R8 => "immutable_constraints_hold",
            Self::R9 => "relationship_changes_are_traceable",
            Self::R10 => "draft_fidelity",
        }
    }

    /// Short numeric tag used in rewrite instruction strings (`"R3: ..."`).
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::R1 => "R1",
            Self::R2 => "R2",
            Self::R3 => "R3",
            Self::R4 => "R4",
            Self::R5 => "R5",
            Self::R6 => "R6",
            Self::R7 => "R7",
            Self::R8 => "R8",
            Self::R9 => "R9",
            Self::R10 => "R10",
        }
    }
}

/// Severity of a rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks PASS outright.
    Error,
    /// Blocks PASS only when it cannot be auto-fixed.
    Warning,
}

/// One diagnostic produced by a rule.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuleViolation {
    /// Which rule fired.
    pub rule_id: RuleId,
    /// Human-readable rule name.
    pub rule_name: &'static str,
    /// Severity.
    pub severity: Severity,
    /// Human-readable diagnostic message.
    pub message: String,
    /// Entity the violation concerns, if any.
    pub entity_id: Option<String>,
    /// Whether this violation can be auto-repaired.
    pub fixable: bool,
}

impl RuleViolation {
    /// Convenience constructor that fills in `rule_name` from `rule_id`.
    #[must_use]
    pub fn new(
        rule_id: RuleId,
        severity: Severity,
        message: impl Into<String>,
        entity_id: Option<String>,
        fixable: bool,
    ) -> Self {
        Self {
            rule_id,
            rule_name: rule_id.name(),
            severity,
            message: message.into(),
            entity_id,
            fixable,
        }
    }
}

// ============================================================================
// SECTION: Action and Result
// ============================================================================

/// The gate's classification of a candidate batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// No violations; commit as-is.
    Pass,
    /// Fixable warnings only; commit the batch plus synthesised `fixes`.
    AutoFix,
    /// Unfixable errors that don't warrant user clarification; reject with
    /// rewrite instructions.
    Rewrite,
    /// Errors whose message matches the clarification-worthy categories;
    /// surface questions instead of a blind rewrite.
    AskUser,
}

/// The gate's full verdict on a batch.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ValidationResult {
    /// Classification.
    pub action: Option<Action>,
    /// Human-readable reasons (rewrite instructions when `action == Rewrite`).
    pub reasons: Vec<String>,
    /// Every violation gathered across all ten rules.
    pub violations: Vec<RuleViolation>,
    /// Synthesised repair patch, present only when `action == AutoFix`.
    pub fixes: Option<crate::event::StatePatch>,
    /// Clarification questions, present only when `action == AskUser`.
    pub questions: Vec<String>,
}

const MULTI_OWNERSHIP_MARKER: &str = "多重归属";
const DEAD_CHARACTER_MARKER: &str = "死亡角色";

/// Runs the ten-rule gate over `(current_state, pending_events)` and
/// classifies the batch per the documented action-decision algorithm.
///
/// Never fails: a batch that cannot even be projected still yields a
/// `ValidationResult` (the projection step itself is infallible given the
/// applier's failure semantics; see [`crate::applier::apply_many`]).
#[must_use]
pub fn evaluate(current_state: &CanonicalState, pending_events: &[Event], clock: &dyn Clock) -> ValidationResult {
    let temp_state = crate::applier::apply_many(current_state, pending_events, clock)
        .unwrap_or_else(|_| current_state.clone());

    let mut violations = Vec::new();
    violations.extend(rules::r1_unique_item_single_ownership(current_state, &temp_state, pending_events));
    violations.extend(rules::r2_item_position_owner_coherence(current_state, &temp_state, pending_events));
    violations.extend(rules::r3_dead_characters_cannot_act(current_state, &temp_state, pending_events));
    violations.extend(rules::r4_explicit_event_type_for_life_state_changes(current_state, &temp_state, pending_events));
    violations.extend(rules::r5_location_changes_require_travel(current_state, &temp_state, pending_events));
    violations.extend(rules::r6_single_location_per_character(current_state, &temp_state, pending_events));
    violations.extend(rules::r7_monotonic_timeline(current_state, &temp_state, pending_events));
    violations.extend(rules::r8_immutable_constraints_hold(current_state, &temp_state, pending_events));
    violations.extend(rules::r9_relationship_changes_are_traceable(current_state, &temp_state, pending_events));

    for violation in &violations {
        tracing::debug!(
            rule = violation.rule_id.tag(),
            severity = ?violation.severity,
            entity_id = violation.entity_id.as_deref(),
            "gate rule violation"
        );
    }

    let result = decide(violations, &temp_state);
    tracing::info!(action = ?result.action, violation_count = result.violations.len(), "gate evaluation complete");
    result
}

/// Consults R10 against a raw draft text, independent of the event-batch
/// path.
#[must_use]
pub fn evaluate_draft_fidelity(current_state: &CanonicalState, draft_text: &str) -> Vec<RuleViolation> {
    rules::r10_draft_fidelity(current_state, draft_text)
}

fn decide(violations: Vec<RuleViolation>, temp_state: &CanonicalState) -> ValidationResult {
    if violations.is_empty() {
        return ValidationResult {
            action: Some(Action::Pass),
            ..ValidationResult::default()
        };
    }

    let errors: Vec<&RuleViolation> = violations.iter().filter(|v| v.severity == Severity::Error).collect();
    let warnings: Vec<&RuleViolation> = violations.iter().filter(|v| v.severity == Severity::Warning).collect();

    if !errors.is_empty() {
        let clarification_worthy = errors
            .iter()
            .any(|v| v.message.contains(MULTI_OWNERSHIP_MARKER) || v.message.contains(DEAD_CHARACTER_MARKER));

        if clarification_worthy {
            let questions = errors
                .iter()
                .map(|v| format!("请确认：{}", v.message))
                .collect();
            return ValidationResult {
                action: Some(Action::AskUser),
                questions,
                violations,
                ..ValidationResult::default()
            };
        }

        let reasons = errors.iter().map(|v| format!("{}: {}", v.rule_id.tag(), v.message)).collect();
        return ValidationResult {
            action: Some(Action::Rewrite),
            reasons,
            violations,
            ..ValidationResult::default()
        };
    }

    let all_fixable = warnings.iter().all(|v| v.fixable);
    if all_fixable {
        let fixes = rules::synthesize_r2_fixes(&warnings, temp_state);
        return ValidationResult {
            action: Some(Action::AutoFix),
            fixes: Some(fixes),
            violations,
            ..ValidationResult::default()
        };
    }

    let reasons = warnings.iter().map(|v| format!("{}: {}", v.rule_id.tag(), v.message)).collect();
    ValidationResult {
        action: Some(Action::Rewrite),
        reasons,
        violations,
        ..ValidationResult::default()
    }
}

/// Reconstructs a completed [`EntityUpdate`] setting only `location_id`, used
/// by [`rules::synthesize_r2_fixes`].
pub(crate) fn location_only_update(location_id: crate::identifiers::LocationId) -> EntityUpdate {
    EntityUpdate {
        location_id: Some(location_id),
        ..EntityUpdate::default()
    }
}
