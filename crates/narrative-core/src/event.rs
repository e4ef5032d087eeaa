// crates/narrative-core/src/event.rs
// ============================================================================
// Module: Events and State Patches
// Description: The closed event-type taxonomy, per-type payload validation,
//              and the state-patch shape produced by the extractor.
// Purpose: Give the extractor and gate a single typed contract for "what
//          changed" independent of how it was derived from prose.
// Dependencies: crate::{identifiers, time, error}, serde
// ============================================================================

//! ## Overview
//! An [`Event`] is the extractor's structured account of one state-changing
//! occurrence in a draft continuation. Every event must carry a
//! [`StatePatch`] with at least one non-empty effect (the traceability
//! invariant) — an event with no effect on canonical state cannot be
//! constructed. `time`, `where_`, and `who` describe the occurrence itself
//! and feed the gate's rules (R3, R5, R6, R7); `state_patch` is what the
//! applier actually folds into canonical state.

use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;
use crate::identifiers::CharacterId;
use crate::identifiers::EventId;
use crate::identifiers::FactionId;
use crate::identifiers::ItemId;
use crate::identifiers::LocationId;
use crate::identifiers::QuestId;
use crate::state::Metadata;
use crate::state::QuestStatus;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Event Type
// ============================================================================

/// The closed set of state-changing event kinds the extractor may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// An item changed owner.
    OwnershipChange,
    /// A character died.
    Death,
    /// A character was revived.
    Revival,
    /// A character or the player changed location.
    Travel,
    /// A character's faction affiliation changed.
    FactionChange,
    /// A quest began.
    QuestStart,
    /// A quest completed successfully.
    QuestComplete,
    /// A quest failed.
    QuestFail,
    /// A new item entered play.
    ItemCreate,
    /// An item left play permanently.
    ItemDestroy,
    /// A relationship field changed without a dedicated event type covering it.
    RelationshipChange,
    /// Narrative time advanced.
    TimeAdvance,
    /// Any other state-changing occurrence not covered above.
    Other,
}

impl EventType {
    /// Returns the required `payload` keys for this event type, used by
    /// the extractor to validate the LLM's structured output before it ever
    /// reaches the gate.
    #[must_use]
    pub fn required_payload_keys(self) -> &'static [&'static str] {
        match self {
            Self::OwnershipChange => &["item_id", "old_owner_id", "new_owner_id"],
            Self::Death | Self::Revival => &["character_id"],
            Self::Travel => &["character_id", "from_location_id", "to_location_id"],
            Self::FactionChange => &["character_id", "old_faction_id", "new_faction_id"],
            Self::QuestStart | Self::QuestComplete | Self::QuestFail => &["quest_id"],
            Self::ItemCreate | Self::ItemDestroy => &["item_id"],
            Self::TimeAdvance => &["time_anchor"],
            Self::RelationshipChange | Self::Other => &[],
        }
    }
}

// ============================================================================
// SECTION: Event Envelope
// ============================================================================

/// The narrative-time coordinate an event occurred at. Distinct from
/// [`crate::time::TimeAnchor`]: this is the event's own claim, checked by R7
/// against the state's anchor, not the state's anchor itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTime {
    /// Human-readable label for the moment this event occurred.
    pub label: String,
    /// Monotonic ordering value.
    pub order: u64,
}

/// Where an event occurred, used by R6's per-time-group location grouping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventWhere {
    /// Location the event occurred at, if any.
    #[serde(default)]
    pub location_id: Option<LocationId>,
}

/// Who was involved in an event, used by R3 and R6.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventWho {
    /// Character ids that acted in this event.
    #[serde(default)]
    pub actors: Vec<String>,
    /// Character ids that merely witnessed this event.
    #[serde(default)]
    pub witnesses: Vec<String>,
}

/// Provenance of an extracted event, for audit and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Origin tag, e.g. `draft_turn_{turn}`.
    pub source: String,
    /// First slice of the draft text this event was derived from.
    #[serde(default)]
    pub text_span: Option<String>,
}

// ============================================================================
// SECTION: Entity Update
// ============================================================================

/// Which entity map an [`EntityUpdate`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A character.
    Character,
    /// An item.
    Item,
    /// A location.
    Location,
    /// A faction.
    Faction,
}

/// A single entity's field-level change, keyed by entity id in
/// [`StatePatch::entity_updates`].
///
/// # Invariants
/// - If the entity does not yet exist and `name` is absent, the update is a
///   silent no-op when applied — the extractor should always supply
///   `name` when introducing a new entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityUpdate {
    /// Which entity map this update targets. Required to materialise a
    /// brand-new entity; advisory (but still honoured) for an existing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityKind>,
    /// Display name; required to materialise a brand-new entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New location, for characters and items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    /// New alive status, for characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
    /// New faction affiliation, for characters. `Some(None)` clears it;
    /// absent leaves it untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_id: Option<Option<FactionId>>,
    /// New owner, for items. `Some(None)` clears ownership (item becomes
    /// purely location-resident); absent leaves it untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Option<String>>,
    /// New parent location, for locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_location_id: Option<Option<LocationId>>,
    /// New faction leader, for factions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<Option<CharacterId>>,
    /// Character ids to add as faction members.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_add: Vec<CharacterId>,
    /// Whether this update is unique-item flagged (item creation only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Metadata keys to merge (not replace) into the entity.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// A change to the player's own fields. Closed key set: `location_id`,
/// `party_add`/`party_remove`, `inventory_add`/`inventory_remove`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerUpdate {
    /// New player location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    /// Character ids to add to the party.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub party_add: Vec<CharacterId>,
    /// Character ids to remove from the party.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub party_remove: Vec<CharacterId>,
    /// Item ids to add to the inventory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inventory_add: Vec<ItemId>,
    /// Item ids to remove from the inventory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inventory_remove: Vec<ItemId>,
}

/// A change to narrative time, folded into `state.time` on apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeUpdate {
    /// New calendar label, if the calendar itself changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<String>,
    /// New anchor label.
    pub label: String,
    /// New anchor order. Should be `>=` the current order (checked by R7,
    /// not enforced by the applier itself).
    pub order: u64,
}

/// A quest's lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestUpdate {
    /// Quest identifier.
    pub quest_id: QuestId,
    /// Title, required when introducing a brand-new quest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New status.
    pub status: QuestStatus,
    /// Prerequisite quest ids, set only when introducing a new quest.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<QuestId>,
}

/// A new constraint to register. Constraints are append-only: applying
/// a patch never removes an existing constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintAddition {
    /// Constraint identifier.
    pub id: crate::identifiers::ConstraintId,
    /// Constraint kind.
    #[serde(rename = "type")]
    pub kind: crate::state::ConstraintType,
    /// Human-readable description.
    pub description: String,
    /// Entity the constraint targets, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Free-form predicate value.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub value: Metadata,
}

// ============================================================================
// SECTION: State Patch
// ============================================================================

/// The full set of effects one event applies to canonical state.
///
/// # Invariants
/// - At least one section must be non-empty (the traceability invariant);
///   enforced by [`Event::new`], not by this type alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatePatch {
    /// Per-entity field updates, keyed by entity id.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub entity_updates: std::collections::BTreeMap<String, EntityUpdate>,
    /// Player-own-field updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_updates: Option<PlayerUpdate>,
    /// Narrative time update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_update: Option<TimeUpdate>,
    /// Quest lifecycle updates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quest_updates: Vec<QuestUpdate>,
    /// New constraints to register.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint_additions: Vec<ConstraintAddition>,
}

impl StatePatch {
    /// Returns `true` when every section is empty, i.e. this patch has no
    /// observable effect on canonical state.
    #[must_use]
    pub fn is_empty_effect(&self) -> bool {
        self.entity_updates.is_empty()
            && self.player_updates.is_none()
            && self.time_update.is_none()
            && self.quest_updates.is_empty()
            && self.constraint_additions.is_empty()
    }
}

// ============================================================================
// SECTION: Event
// ============================================================================

/// One structured, state-changing occurrence extracted from a draft.
///
/// # Invariants
/// - `state_patch` is never an empty-effect patch (enforced at
///   construction via [`Event::new`]).
/// - `event_id` is assigned by the extractor, never by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier assigned by the extractor.
    pub event_id: EventId,
    /// Request-cycle turn this event was extracted during.
    pub turn: u64,
    /// Narrative-time coordinate this event claims to occur at.
    pub time: EventTime,
    /// Where this event occurred.
    #[serde(default, rename = "where")]
    pub where_: EventWhere,
    /// Who was involved.
    #[serde(default)]
    pub who: EventWho,
    /// Event kind.
    pub event_type: EventType,
    /// One-line human-readable summary of what happened.
    pub summary: String,
    /// Free-form payload; required keys per [`EventType::required_payload_keys`].
    #[serde(default)]
    pub payload: Metadata,
    /// The effects this event applies to canonical state.
    pub state_patch: StatePatch,
    /// Provenance.
    pub evidence: Evidence,
    /// Wall-clock creation time, stamped by the extractor.
    pub created_at: Timestamp,
}

impl Event {
    /// Constructs an event, enforcing the traceability invariant and the
    /// non-empty-summary invariant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyEffects`] when `state_patch` has no
    /// non-empty section, or [`CoreError::MalformedEvent`] when `summary`
    /// is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: EventId,
        turn: u64,
        time: EventTime,
        where_: EventWhere,
        who: EventWho,
        event_type: EventType,
        summary: impl Into<String>,
        payload: Metadata,
        state_patch: StatePatch,
        evidence: Evidence,
        created_at: Timestamp,
    ) -> Result<Self, CoreError> {
        if state_patch.is_empty_effect() {
            return Err(CoreError::EmptyEffects);
        }
        let summary = summary.into();
        if summary.trim().is_empty() {
            return Err(CoreError::MalformedEvent {
                reason: "summary must not be empty".to_string(),
            });
        }
        Ok(Self {
            event_id,
            turn,
            time,
            where_,
            who,
            event_type,
            summary,
            payload,
            state_patch,
            evidence,
            created_at,
        })
    }

    /// Returns `payload["key"]` as a string, if present and string-typed.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::LocationId;
    use crate::state::ConstraintType;
    use crate::time::Timestamp;

    fn sample_patch() -> StatePatch {
        StatePatch {
            entity_updates: std::collections::BTreeMap::new(),
            player_updates: Some(PlayerUpdate {
                location_id: Some(LocationId::new("xuchang")),
                ..Default::default()
            }),
            time_update: None,
            quest_updates: Vec::new(),
            constraint_additions: Vec::new(),
        }
    }

    fn evidence() -> Evidence {
        Evidence {
            source: "draft_turn_1".to_string(),
            text_span: None,
        }
    }

    #[test]
    fn empty_patch_is_rejected() {
        let event_id = EventId::new("evt_1_0_deadbeef").unwrap();
        let result = Event::new(
            event_id,
            1,
            EventTime { label: "建安三年".to_string(), order: 3 },
            EventWhere::default(),
            EventWho::default(),
            EventType::Other,
            "对话继续",
            Metadata::new(),
            StatePatch::default(),
            evidence(),
            Timestamp::from_unix_seconds(0),
        );
        assert!(matches!(result, Err(CoreError::EmptyEffects)));
    }

    #[test]
    fn non_empty_patch_is_accepted() {
        let event_id = EventId::new("evt_1_0_deadbeef").unwrap();
        let result = Event::new(
            event_id,
            1,
            EventTime { label: "建安三年".to_string(), order: 3 },
            EventWhere::default(),
            EventWho::default(),
            EventType::Travel,
            "角色前往许昌",
            Metadata::new(),
            sample_patch(),
            evidence(),
            Timestamp::from_unix_seconds(0),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn blank_summary_is_rejected() {
        let event_id = EventId::new("evt_1_0_deadbeef").unwrap();
        let result = Event::new(
            event_id,
            1,
            EventTime { label: "建安三年".to_string(), order: 3 },
            EventWhere::default(),
            EventWho::default(),
            EventType::Travel,
            "   ",
            Metadata::new(),
            sample_patch(),
            evidence(),
            Timestamp::from_unix_seconds(0),
        );
        assert!(matches!(result, Err(CoreError::MalformedEvent { .. })));
    }

    #[test]
    fn constraint_addition_carries_description() {
        let addition = ConstraintAddition {
            id: crate::identifiers::ConstraintId::new("c1"),
            kind: ConstraintType::ImmutableEvent,
            description: "曹操已死，不可复生".to_string(),
            entity_id: Some("caocao".to_string()),
            value: Metadata::new(),
        };
        assert_eq!(addition.kind, ConstraintType::ImmutableEvent);
    }
}
