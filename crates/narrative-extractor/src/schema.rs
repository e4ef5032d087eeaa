// crates/narrative-extractor/src/schema.rs
// ============================================================================
// Module: Extraction Wire Schema
// Description: The JSON shape the model is asked to produce, and the tool
//              and JSON-object schemas that constrain it.
// Purpose: Give both call modes the same target shape so the rest of
//          the extractor is agnostic to which mode actually answered.
// Dependencies: narrative-core, serde, serde_json
// ============================================================================

//! ## Overview
//! `ExtractedEvent` is [`narrative_core::Event`] minus the two fields the
//! model must never assign (`event_id`, `created_at`) plus a `confidence`
//! score the model self-reports and which the extractor currently only logs
//!. `ExtractionResponse` wraps a batch of these
//! plus any `open_questions` the model wants to surface even when it isn't
//! asked to.

use narrative_core::event::Evidence;
use narrative_core::event::EventType;
use narrative_core::event::EventTime;
use narrative_core::event::EventWhere;
use narrative_core::event::EventWho;
use narrative_core::event::StatePatch;
use narrative_core::state::Metadata;
use serde::Deserialize;
use serde::Serialize;

/// One event as the model reports it, prior to `event_id`/`created_at`
/// assignment and [`narrative_core::Event::new`]'s validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEvent {
    /// Narrative-time coordinate the model claims.
    #[serde(default)]
    pub time: Option<EventTime>,
    /// Where the model claims this occurred.
    #[serde(default, rename = "where")]
    pub where_: EventWhere,
    /// Who the model claims was involved.
    #[serde(default)]
    pub who: EventWho,
    /// Event kind.
    pub event_type: EventType,
    /// One-line summary.
    #[serde(default)]
    pub summary: String,
    /// Free-form payload.
    #[serde(default)]
    pub payload: Metadata,
    /// The effects this event applies to canonical state.
    #[serde(default)]
    pub state_patch: StatePatch,
    /// Model-reported confidence in `[0, 1]`; logged, not gated on.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The top-level shape both call modes are asked to produce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResponse {
    /// Extracted events, in the order the model found them.
    #[serde(default)]
    pub events: Vec<ExtractedEvent>,
    /// Clarification questions the model wants to raise unprompted.
    #[serde(default)]
    pub open_questions: Vec<String>,
}

/// Builds the evidence envelope shared by every event extracted from one
/// draft: `source = "draft_turn_{turn}"`, `text_span` is the
/// first 200 characters of the draft.
#[must_use]
pub fn evidence_for_draft(turn: u64, draft: &str) -> Evidence {
    const SPAN_LEN: usize = 200;
    let text_span: String = draft.chars().take(SPAN_LEN).collect();
    Evidence {
        source: format!("draft_turn_{turn}"),
        text_span: Some(text_span),
    }
}

/// Returns the JSON Schema describing [`ExtractionResponse`], used both as
/// the tool call's parameter schema and as the JSON-object mode's response
/// format schema. Intentionally permissive on `state_patch`'s shape (it is
/// validated structurally by [`narrative_core::Event::new`] downstream, not
/// by the schema itself) — an overly strict schema here would just move
/// parse failures from one side of the retry loop to the other.
#[must_use]
pub fn extraction_json_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "time": {
                            "type": "object",
                            "properties": {
                                "label": {"type": "string"},
                                "order": {"type": "integer"}
                            }
                        },
                        "where": {
                            "type": "object",
                            "properties": {
                                "location_id": {"type": ["string", "null"]}
                            }
                        },
                        "who": {
                            "type": "object",
                            "properties": {
                                "actors": {"type": "array", "items": {"type": "string"}},
                                "witnesses": {"type": "array", "items": {"type": "string"}}
                            }
                        },
                        "event_type": {
                            "type": "string",
                            "enum": [
                                "OWNERSHIP_CHANGE", "DEATH", "REVIVAL", "TRAVEL",
                                "FACTION_CHANGE", "QUEST_START", "QUEST_COMPLETE",
                                "QUEST_FAIL", "ITEM_CREATE", "ITEM_DESTROY",
                                "RELATIONSHIP_CHANGE", "TIME_ADVANCE", "OTHER"
                            ]
                        },
                        "summary": {"type": "string"},
                        "payload": {"type": "object"},
                        "state_patch": {"type": "object"},
                        "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                    },
                    "required": ["event_type", "summary", "state_patch"]
                }
            },
            "open_questions": {
                "type": "array",
                "items": {"type": "string"}
            }
        },
        "required": ["events", "open_questions"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_span_is_truncated_to_200_chars() {
        let draft: String = "字".repeat(500);
        let evidence = evidence_for_draft(3, &draft);
        assert_eq!(evidence.source, "draft_turn_3");
        assert_eq!(evidence.text_span.unwrap().chars().count(), 200);
    }

    #[test]
    fn schema_requires_events_and_open_questions() {
        let schema = extraction_json_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "events"));
        assert!(required.iter().any(|v| v == "open_questions"));
    }
}
