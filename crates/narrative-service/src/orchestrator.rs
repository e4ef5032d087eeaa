// crates/narrative-service/src/orchestrator.rs
// ============================================================================
// Module: Draft Processing Orchestration
// Description: Wires load → extract → gate → commit into the single
//              request-cycle pipeline.
// Purpose: The one place that calls every external collaborator for one
//          `POST /draft/process` request, in the documented order.
// Dependencies: narrative-core, narrative-extractor, narrative-store-sqlite
// ============================================================================

//! ## Overview
//! Load canonical state, call the
//! extractor, run the gate, then take the action-specific path (commit on
//! PASS/AUTO_FIX, return diagnostics untouched on REWRITE/ASK_USER). The
//! per-story lock is acquired by the caller (the route handler) for
//! the duration of this call; this module does not know about locking.

use narrative_core::event::Event;
use narrative_core::event::EventTime;
use narrative_core::event::EventType;
use narrative_core::event::EventWhere;
use narrative_core::event::EventWho;
use narrative_core::gate::Action;
use narrative_core::gate::RuleViolation;
use narrative_core::gate::ValidationResult;
use narrative_core::identifiers::EventId;
use narrative_core::identifiers::StoryId;
use narrative_core::interfaces::LLMClient;
use narrative_core::state::CanonicalState;
use narrative_core::time::Clock;
use narrative_extractor::extractor;
use uuid::Uuid;

use crate::error::ServiceError;
use narrative_store_sqlite::SqliteStore;

/// The orchestrator's result for one `POST /draft/process` request,
/// independent of its HTTP encoding.
#[derive(Debug, Clone)]
pub struct DraftProcessOutcome {
    /// The gate's classification.
    pub action: Action,
    /// Current state after this request (unchanged on REWRITE/ASK_USER).
    pub state: CanonicalState,
    /// Events committed this request; empty when nothing was committed.
    pub recent_events: Vec<Event>,
    /// Rewrite instructions, present only for `Action::Rewrite`.
    pub rewrite_instructions: Vec<String>,
    /// Clarification questions, present for `Action::AskUser` or when the
    /// extractor itself raised `open_questions`.
    pub questions: Vec<String>,
    /// Every violation the gate gathered (empty on PASS or on an
    /// extractor-level clarification request).
    pub violations: Vec<RuleViolation>,
}

/// Runs one draft-processing request to completion: load, extract,
/// evaluate, and — for PASS/AUTO_FIX — commit.
///
/// # Errors
///
/// Returns [`ServiceError`] on any store-boundary failure. Gate and extractor outcomes are never errors.
pub fn process_draft(
    store: &SqliteStore,
    llm: &dyn LLMClient,
    clock: &dyn Clock,
    story_id: &StoryId,
    user_message: &str,
    assistant_draft: &str,
) -> Result<DraftProcessOutcome, ServiceError> {
    let current_state = load_or_init(store, clock, story_id)?;
    let turn = current_state.meta.turn + 1;

    let extraction = extractor::extract(llm, clock, &current_state, user_message, assistant_draft, turn);

    if extraction.requires_user_input {
        return Ok(DraftProcessOutcome {
            action: Action::AskUser,
            state: current_state,
            recent_events: Vec::new(),
            rewrite_instructions: Vec::new(),
            questions: extraction.open_questions,
            violations: Vec::new(),
        });
    }

    let verdict = narrative_core::gate::evaluate(&current_state, &extraction.events, clock);
    commit_or_return(store, clock, story_id, current_state, extraction.events, verdict)
}

/// Consults R10 against raw draft text, independent of the event-batch path
///.
#[must_use]
pub fn validate_draft_fidelity(state: &CanonicalState, draft_text: &str) -> Vec<RuleViolation> {
    narrative_core::gate::evaluate_draft_fidelity(state, draft_text)
}

fn load_or_init(store: &SqliteStore, clock: &dyn Clock, story_id: &StoryId) -> Result<CanonicalState, ServiceError> {
    use narrative_core::interfaces::StateStore;

    if let Some(state) = store.load(story_id)? {
        return Ok(state);
    }
    let initial = CanonicalState::initial(story_id.clone(), clock.now());
    store.save(story_id, &initial)?;
    Ok(initial)
}

fn commit_or_return(
    store: &SqliteStore,
    clock: &dyn Clock,
    story_id: &StoryId,
    current_state: CanonicalState,
    events: Vec<Event>,
    verdict: ValidationResult,
) -> Result<DraftProcessOutcome, ServiceError> {
    let Some(action) = verdict.action else {
        // The gate always sets `action`; an unset action is only reachable
        // via `ValidationResult::default()`, which this pipeline never
        // constructs directly. Treat it defensively as REWRITE so a
        // malformed verdict never gets silently committed.
        return Ok(DraftProcessOutcome {
            action: Action::Rewrite,
            state: current_state,
            recent_events: Vec::new(),
            rewrite_instructions: verdict.reasons,
            questions: Vec::new(),
            violations: verdict.violations,
        });
    };

    match action {
        Action::Pass => {
            let next_state = narrative_core::applier::apply_many(&current_state, &events, clock)
                .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
            store.commit_turn(story_id, &next_state, &events)?;
            Ok(DraftProcessOutcome {
                action,
                state: next_state,
                recent_events: events,
                rewrite_instructions: Vec::new(),
                questions: Vec::new(),
                violations: Vec::new(),
            })
        }
        Action::AutoFix => {
            let fixes = verdict.fixes.unwrap_or_default();
            let turn = current_state.meta.turn + 1;
            let mut all_events = events;
            if !fixes.is_empty_effect() {
                all_events.push(synthesize_fix_event(turn, clock, fixes));
            }
            let next_state = narrative_core::applier::apply_many(&current_state, &all_events, clock)
                .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
            store.commit_turn(story_id, &next_state, &all_events)?;
            Ok(DraftProcessOutcome {
                action,
                state: next_state,
                recent_events: all_events,
                rewrite_instructions: Vec::new(),
                questions: Vec::new(),
                violations: verdict.violations,
            })
        }
        Action::Rewrite => Ok(DraftProcessOutcome {
            action,
            state: current_state,
            recent_events: Vec::new(),
            rewrite_instructions: verdict.reasons,
            questions: Vec::new(),
            violations: verdict.violations,
        }),
        Action::AskUser => Ok(DraftProcessOutcome {
            action,
            state: current_state,
            recent_events: Vec::new(),
            rewrite_instructions: Vec::new(),
            questions: verdict.questions,
            violations: verdict.violations,
        }),
    }
}

/// Wraps an `AUTO_FIX` verdict's synthesised `fixes` patch in its own
/// event, so the event log carries a full record of how the committed
/// state came to be — the gate's repair is not applied invisibly.
fn synthesize_fix_event(turn: u64, clock: &dyn Clock, fixes: narrative_core::event::StatePatch) -> Event {
    let event_id = EventId::new(format!("evt_{turn}_{}_{}", clock.now().as_unix_seconds(), &Uuid::new_v4().simple().to_string()[..8]))
        .expect("evt_ prefix is always present");
    Event::new(
        event_id,
        turn,
        EventTime { label: String::new(), order: 0 },
        EventWhere::default(),
        EventWho::default(),
        EventType::Other,
        "自动修复：物品位置与所有者同步",
        narrative_core::state::Metadata::new(),
        fixes,
        narrative_core::event::Evidence { source: format!("auto_fix_turn_{turn}"), text_span: None },
        clock.now(),
    )
    .expect("R2 fixes always carry at least one entity_updates entry")
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrative_core::interfaces::ChatMessage;
    use narrative_core::interfaces::LlmError;
    use narrative_core::time::FixedClock;
    use narrative_core::time::Timestamp;
    use narrative_store_sqlite::SqliteStoreConfig;

    struct StubLlm(serde_json::Value);
    impl LLMClient for StubLlm {
        fn call_with_tool(&self, _messages: &[ChatMessage], _schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
            Ok(self.0.clone())
        }
        fn call_with_json(&self, _messages: &[ChatMessage], _schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("narrative.db");
        let store = SqliteStore::new(SqliteStoreConfig::new(path)).expect("store opens");
        (dir, store)
    }

    #[test]
    fn first_request_auto_initialises_and_passes_default_event() {
        let (_dir, store) = temp_store();
        let clock = FixedClock(Timestamp::from_unix_seconds(100));
        let llm = StubLlm(serde_json::json!({"events": [], "open_questions": []}));
        let story_id = StoryId::new("story-1");

        let outcome = process_draft(&store, &llm, &clock, &story_id, "你好", "故事继续。").unwrap();
        assert_eq!(outcome.action, Action::Pass);
        assert_eq!(outcome.recent_events.len(), 1);
        assert_eq!(outcome.state.meta.turn, 1);
    }

    #[test]
    fn open_questions_short_circuit_before_the_gate() {
        let (_dir, store) = temp_store();
        let clock = FixedClock(Timestamp::from_unix_seconds(100));
        let llm = StubLlm(serde_json::json!({
            "events": [],
            "open_questions": ["这把剑是从哪里来的？"]
        }));
        let story_id = StoryId::new("story-2");

        let outcome = process_draft(&store, &llm, &clock, &story_id, "他拔出了剑", "一把从未提到过的剑").unwrap();
        assert_eq!(outcome.action, Action::AskUser);
        assert_eq!(outcome.questions.len(), 1);
        assert!(outcome.recent_events.is_empty());
    }
}
