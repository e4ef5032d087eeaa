// crates/narrative-extractor/src/extractor.rs
// ============================================================================
// Module: Event Extraction
// Description: Orchestrates the LLM call(s), recovers from malformed
//              responses, and assigns event ids.
// Purpose: Turn one draft continuation into a batch of structured events
//          the gate can evaluate, never silently dropping a turn.
// Dependencies: narrative-core, crate::{prompt, schema, llm}, uuid
// ============================================================================

//! ## Overview
//! The extraction contract: try a forced tool/function call first, retry once with a
//! stricter reminder, then fall back to JSON-object mode and retry once
//! more. Individual malformed events are skipped rather than failing the
//! whole batch (mirrors a single bad LLM-authored event not being allowed to
//! block every other event extracted from the same draft). If nothing
//! survives and the model raised no open question, a default `OTHER` event
//! is synthesised so a turn is never silently dropped. The default event is
//! never emitted alongside real events or open questions.

use narrative_core::event::EntityUpdate;
use narrative_core::event::Event;
use narrative_core::event::EventTime;
use narrative_core::event::EventType;
use narrative_core::event::EventWhere;
use narrative_core::event::EventWho;
use narrative_core::event::StatePatch;
use narrative_core::identifiers::EventId;
use narrative_core::interfaces::ChatMessage;
use narrative_core::interfaces::LLMClient;
use narrative_core::state::CanonicalState;
use narrative_core::time::Clock;
use uuid::Uuid;

use crate::prompt;
use crate::schema;
use crate::schema::ExtractedEvent;
use crate::schema::ExtractionResponse;

const MAX_RETRIES_PER_MODE: usize = 1;

/// The extractor's public result for one draft.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Structured events extracted from the draft, with `event_id` assigned.
    pub events: Vec<Event>,
    /// Clarification questions the model raised.
    pub open_questions: Vec<String>,
    /// Whether the caller should surface `open_questions` instead of
    /// committing `events`.
    pub requires_user_input: bool,
}

/// Extracts a batch of events from one draft continuation.
///
/// Never fails: transport and schema failures degrade to a default `OTHER`
/// event rather than propagating an error, so one unreachable LLM never
/// blocks a turn.
pub fn extract(llm: &dyn LLMClient, clock: &dyn Clock, state: &CanonicalState, user_message: &str, draft: &str, turn: u64) -> ExtractionOutcome {
    let system = prompt::system_prompt(state, turn);
    let user = prompt::user_prompt(user_message, draft);
    let base_messages = vec![
        ChatMessage { role: "system".to_string(), content: system },
        ChatMessage { role: "user".to_string(), content: user },
    ];
    let schema_value = schema::extraction_json_schema();

    let raw = call_with_retry(llm, &base_messages, &schema_value);

    let mut events = Vec::new();
    let mut open_questions = Vec::new();
    let mut requires_user_input = false;

    if let Some(response) = raw {
        if !response.open_questions.is_empty() {
            open_questions = response.open_questions;
            requires_user_input = true;
        }
        for extracted in response.events {
            match convert_to_event(extracted, turn, draft, clock) {
                Ok(event) => events.push(event),
                Err(reason) => tracing::warn!(turn, reason = %reason, "dropping malformed extracted event"),
            }
        }
    } else {
        tracing::warn!(turn, "llm extraction failed in both call modes; falling back to default event");
    }

    if events.is_empty() && !requires_user_input {
        events.push(default_event(state, turn, draft, clock));
    }

    ExtractionOutcome { events, open_questions, requires_user_input }
}

fn call_with_retry(llm: &dyn LLMClient, base_messages: &[ChatMessage], schema_value: &serde_json::Value) -> Option<ExtractionResponse> {
    if let Some(response) = try_mode(base_messages, |messages| llm.call_with_tool(messages, schema_value)) {
        return Some(response);
    }

    try_mode(base_messages, |messages| llm.call_with_json(messages, schema_value))
}

/// Tries one call mode up to `MAX_RETRIES_PER_MODE` extra times, appending
/// `retry_reminder()` on every retry. A retry fires both on transport
/// failure and on a response that fails to parse against [`ExtractionResponse`] —
/// a schema-invalid reply is as much a failure to recover from as a dropped
/// connection.
fn try_mode<F>(base_messages: &[ChatMessage], call: F) -> Option<ExtractionResponse>
where
    F: Fn(&[ChatMessage]) -> Result<serde_json::Value, narrative_core::interfaces::LlmError>,
{
    for attempt in 0..=MAX_RETRIES_PER_MODE {
        let mut messages = base_messages.to_vec();
        if attempt > 0 {
            messages.push(ChatMessage { role: "system".to_string(), content: prompt::retry_reminder() });
        }
        match call(&messages) {
            Ok(value) => match parse_response(&value) {
                Some(response) => return Some(response),
                None => continue,
            },
            Err(err) => tracing::warn!(attempt, error = %err, "extraction call attempt failed"),
        }
    }
    None
}

fn parse_response(value: &serde_json::Value) -> Option<ExtractionResponse> {
    match serde_json::from_value::<ExtractionResponse>(value.clone()) {
        Ok(response) => Some(response),
        Err(err) => {
            tracing::warn!(error = %err, "extraction response did not match schema");
            None
        }
    }
}

fn convert_to_event(extracted: ExtractedEvent, turn: u64, draft: &str, clock: &dyn Clock) -> Result<Event, String> {
    let event_id = assign_event_id(turn, clock);
    let time = extracted.time.unwrap_or(EventTime { label: String::new(), order: 0 });
    Event::new(
        event_id,
        turn,
        time,
        extracted.where_,
        extracted.who,
        extracted.event_type,
        extracted.summary,
        extracted.payload,
        extracted.state_patch,
        schema::evidence_for_draft(turn, draft),
        clock.now(),
    )
    .map_err(|e| e.to_string())
}

fn default_event(state: &CanonicalState, turn: u64, draft: &str, clock: &dyn Clock) -> Event {
    let mut entity_updates = std::collections::BTreeMap::new();
    let mut metadata = narrative_core::state::Metadata::new();
    metadata.insert("last_turn".to_string(), serde_json::json!(turn));
    entity_updates.insert(
        state.player.id.as_str().to_string(),
        EntityUpdate {
            entity_type: Some(narrative_core::event::EntityKind::Character),
            metadata,
            ..EntityUpdate::default()
        },
    );
    let state_patch = StatePatch { entity_updates, ..StatePatch::default() };

    let event_id = assign_event_id(turn, clock);
    Event::new(
        event_id,
        turn,
        EventTime { label: state.time.calendar.clone(), order: state.time.anchor.order },
        EventWhere { location_id: Some(state.player.location_id.clone()) },
        EventWho { actors: vec![state.player.id.as_str().to_string()], witnesses: Vec::new() },
        EventType::Other,
        "对话继续",
        narrative_core::state::Metadata::new(),
        state_patch,
        schema::evidence_for_draft(turn, draft),
        clock.now(),
    )
    .expect("default event always carries a non-empty state_patch and non-blank summary")
}

/// Assigns an event id as `evt_{turn}_{unix_seconds}_{hash8}`,
/// mirroring the original extractor's `uuid.uuid4()[:8]` suffix.
fn assign_event_id(turn: u64, clock: &dyn Clock) -> EventId {
    let timestamp = clock.now().as_unix_seconds();
    let hash_suffix = Uuid::new_v4().simple().to_string()[..8].to_string();
    EventId::new(format!("evt_{turn}_{timestamp}_{hash_suffix}")).expect("evt_ prefix is always present")
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrative_core::identifiers::StoryId;
    use narrative_core::interfaces::LlmError;
    use narrative_core::time::FixedClock;
    use narrative_core::time::Timestamp;

    struct AlwaysFails;
    impl LLMClient for AlwaysFails {
        fn call_with_tool(&self, _messages: &[ChatMessage], _schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
            Err(LlmError::Transport("unreachable in test".to_string()))
        }
        fn call_with_json(&self, _messages: &[ChatMessage], _schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
            Err(LlmError::Transport("unreachable in test".to_string()))
        }
    }

    struct ReturnsEvents(serde_json::Value);
    impl LLMClient for ReturnsEvents {
        fn call_with_tool(&self, _messages: &[ChatMessage], _schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
            Ok(self.0.clone())
        }
        fn call_with_json(&self, _messages: &[ChatMessage], _schema: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    fn state() -> CanonicalState {
        CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0))
    }

    #[test]
    fn total_llm_failure_falls_back_to_default_event() {
        let clock = FixedClock(Timestamp::from_unix_seconds(100));
        let outcome = extract(&AlwaysFails, &clock, &state(), "你去哪？", "你继续前行。", 1);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].event_type, EventType::Other);
        assert!(!outcome.requires_user_input);
    }

    #[test]
    fn open_questions_set_requires_user_input_without_default_event() {
        let clock = FixedClock(Timestamp::from_unix_seconds(100));
        let value = serde_json::json!({
            "events": [],
            "open_questions": ["这把剑是从哪里来的？"]
        });
        let outcome = extract(&ReturnsEvents(value), &clock, &state(), "他拔出了剑", "他拔出了一把从未提到过的剑。", 2);
        assert!(outcome.events.is_empty());
        assert!(outcome.requires_user_input);
        assert_eq!(outcome.open_questions.len(), 1);
    }

    #[test]
    fn malformed_event_in_batch_is_skipped_not_fatal() {
        let clock = FixedClock(Timestamp::from_unix_seconds(100));
        let value = serde_json::json!({
            "events": [
                {
                    "event_type": "OTHER",
                    "summary": "",
                    "state_patch": {}
                }
            ],
            "open_questions": []
        });
        let outcome = extract(&ReturnsEvents(value), &clock, &state(), "...", "...", 3);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].event_type, EventType::Other);
    }
}
