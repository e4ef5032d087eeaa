// crates/narrative-core/src/state.rs
// ============================================================================
// Module: Canonical State
// Description: The typed world snapshot and its referential-integrity
//              invariants.
// Purpose: Provide the single authoritative representation of a story's
//          world, one per story_id.
// Dependencies: crate::{identifiers, time, error}, serde
// ============================================================================

//! ## Overview
//! `CanonicalState` is the root aggregate: one per `story_id`, rewritten
//! atomically on every PASS/AUTO_FIX turn. Entities are addressed by
//! id, never by pointer — membership between characters and factions is an
//! invariant checked by [`CanonicalState::check_invariants`], not a
//! structural graph relationship.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;
use crate::identifiers::CharacterId;
use crate::identifiers::ConstraintId;
use crate::identifiers::EventId;
use crate::identifiers::FactionId;
use crate::identifiers::ItemId;
use crate::identifiers::LocationId;
use crate::identifiers::PlayerId;
use crate::identifiers::QuestId;
use crate::identifiers::StoryId;
use crate::time::TimeState;
use crate::time::Timestamp;

/// Free-form metadata attached to entities; opaque to the core.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// SECTION: Meta
// ============================================================================

/// Run-level metadata for a story.
///
/// # Invariants
/// - `turn` is non-negative and only advances on committed turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// Story identifier.
    pub story_id: StoryId,
    /// Canonical state schema/version tag.
    pub canon_version: String,
    /// Monotonic request-cycle counter.
    pub turn: u64,
    /// Identifier of the most recently applied event, if any.
    pub last_event_id: Option<EventId>,
    /// Wall-clock timestamp of the last state write.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Player
// ============================================================================

/// The player's aggregate state.
///
/// # Invariants
/// - `party` contains no duplicates and preserves insertion order.
/// - `inventory` contains no duplicates and preserves insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Player identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Current location.
    pub location_id: LocationId,
    /// Party members, insertion order preserved, no duplicates.
    #[serde(default)]
    pub party: Vec<CharacterId>,
    /// Carried items, insertion order preserved, no duplicates.
    #[serde(default)]
    pub inventory: Vec<ItemId>,
}

// ============================================================================
// SECTION: Entities
// ============================================================================

/// A character in the story.
///
/// # Invariants
/// - `location_id` must resolve to a known location.
/// - `faction_id`, if set, must resolve to a known faction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Character identifier.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Current location.
    pub location_id: LocationId,
    /// Whether the character is alive.
    #[serde(default = "default_true")]
    pub alive: bool,
    /// Current faction, if any.
    #[serde(default)]
    pub faction_id: Option<FactionId>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

const fn default_true() -> bool {
    true
}

/// An item in the story.
///
/// # Invariants
/// - `unique` implies `owner_id` is present.
/// - At least one of `owner_id` or `location_id` must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Owning character or location id, if owned.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Resting location id, if placed rather than owned.
    #[serde(default)]
    pub location_id: Option<LocationId>,
    /// Whether at most one copy of this item may exist.
    #[serde(default)]
    pub unique: bool,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Item {
    /// Validates the item-level invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] when `unique` is set
    /// without an owner, or when neither `owner_id` nor `location_id` is
    /// present.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.unique && self.owner_id.is_none() {
            return Err(CoreError::InvariantViolation(format!(
                "unique item {} must have an owner_id",
                self.id
            )));
        }
        if self.owner_id.is_none() && self.location_id.is_none() {
            return Err(CoreError::InvariantViolation(format!(
                "item {} must have an owner_id or a location_id",
                self.id
            )));
        }
        Ok(())
    }
}

/// A location in the story.
///
/// # Invariants
/// - `parent_location_id`, if set, must resolve to a known location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Location identifier.
    pub id: LocationId,
    /// Display name.
    pub name: String,
    /// Parent location, if nested.
    #[serde(default)]
    pub parent_location_id: Option<LocationId>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// A faction in the story.
///
/// # Invariants
/// - `leader_id`, if set, must resolve to a known character.
/// - Every member must resolve to a known character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    /// Faction identifier.
    pub id: FactionId,
    /// Display name.
    pub name: String,
    /// Faction leader, if any.
    #[serde(default)]
    pub leader_id: Option<CharacterId>,
    /// Member character ids.
    #[serde(default)]
    pub members: Vec<CharacterId>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Quest lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Quest is active.
    Active,
    /// Quest completed successfully.
    Completed,
    /// Quest failed.
    Failed,
}

/// A quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    /// Quest identifier.
    pub id: QuestId,
    /// Display title.
    pub title: String,
    /// Current status.
    pub status: QuestStatus,
    /// Prerequisite quest ids.
    #[serde(default)]
    pub prerequisites: Vec<QuestId>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Constraint kinds recognised by the gate (R8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    /// A specific event may never recur in a future batch.
    ImmutableEvent,
    /// An item id may have at most one owner at a time.
    UniqueItem,
    /// A predicate over an entity's simple state (e.g. `alive`).
    EntityState,
    /// A predicate over a relationship field (e.g. `faction_id`).
    Relationship,
}

/// A declared constraint (never silently removed once added).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint identifier.
    pub id: ConstraintId,
    /// Constraint kind.
    #[serde(rename = "type")]
    pub kind: ConstraintType,
    /// Human-readable description (R8's alternate-history marker lives here).
    pub description: String,
    /// Entity the constraint targets, if any.
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Free-form predicate value (e.g. `{"alive": false}`).
    #[serde(default)]
    pub value: Metadata,
}

/// Entity maps keyed by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entities {
    /// Characters keyed by id.
    #[serde(default)]
    pub characters: BTreeMap<String, Character>,
    /// Items keyed by id.
    #[serde(default)]
    pub items: BTreeMap<String, Item>,
    /// Locations keyed by id.
    #[serde(default)]
    pub locations: BTreeMap<String, Location>,
    /// Factions keyed by id.
    #[serde(default)]
    pub factions: BTreeMap<String, Faction>,
}

/// Active and completed quests.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestState {
    /// Active quests.
    #[serde(default)]
    pub active: Vec<Quest>,
    /// Completed or failed quests.
    #[serde(default)]
    pub completed: Vec<Quest>,
}

/// Story-level constraints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Constraints {
    /// Item ids that must have a single owner at a time.
    #[serde(default)]
    pub unique_item_ids: Vec<ItemId>,
    /// Event ids that may never be resubmitted.
    #[serde(default)]
    pub immutable_events: Vec<EventId>,
    /// Declared constraints.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

// ============================================================================
// SECTION: Canonical State
// ============================================================================

/// The root aggregate: one authoritative world snapshot per story.
///
/// # Invariants
/// - See [`CanonicalState::check_invariants`] for the seven referential-
///   integrity rules enforced whenever a state is constructed or committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalState {
    /// Run-level metadata.
    pub meta: MetaInfo,
    /// Narrative time.
    pub time: TimeState,
    /// Player aggregate.
    pub player: PlayerState,
    /// Entity maps.
    #[serde(default)]
    pub entities: Entities,
    /// Quest state.
    #[serde(default)]
    pub quest: QuestState,
    /// Declared constraints.
    #[serde(default)]
    pub constraints: Constraints,
}

impl CanonicalState {
    /// Builds the initial state auto-created on first request for a story.
    #[must_use]
    pub fn initial(story_id: StoryId, updated_at: Timestamp) -> Self {
        const SEED_LOCATION: &str = "unknown";
        let mut locations = BTreeMap::new();
        locations.insert(
            SEED_LOCATION.to_string(),
            Location {
                id: LocationId::new(SEED_LOCATION),
                name: "未知地点".to_string(),
                parent_location_id: None,
                metadata: Metadata::new(),
            },
        );
        Self {
            meta: MetaInfo {
                story_id,
                canon_version: "1".to_string(),
                turn: 0,
                last_event_id: None,
                updated_at,
            },
            time: TimeState::initial(),
            player: PlayerState {
                id: PlayerId::new("player_001"),
                name: "玩家".to_string(),
                location_id: LocationId::new(SEED_LOCATION),
                party: Vec::new(),
                inventory: Vec::new(),
            },
            entities: Entities {
                characters: BTreeMap::new(),
                items: BTreeMap::new(),
                locations,
                factions: BTreeMap::new(),
            },
            quest: QuestState::default(),
            constraints: Constraints::default(),
        }
    }

    /// Checks the seven referential-integrity invariants.
    ///
    /// # Errors
    ///
    /// Returns the first [`CoreError::InvariantViolation`] or
    /// [`CoreError::UnknownEntity`] encountered. Checks are ordered but not
    /// exhaustively reported — callers needing a full violation list should
    /// use the gate instead; this is the cheap fail-closed boundary check
    /// used at state construction/load/commit time.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        // 1. player.location_id ∈ locations
        self.require_location(self.player.location_id.as_str())?;

        // 2. every party member ∈ characters
        for member in &self.player.party {
            self.require_character(member.as_str())?;
        }

        // 3. every inventory item ∈ items
        for item in &self.player.inventory {
            self.require_item(item.as_str())?;
        }

        for character in self.entities.characters.values() {
            // 4. character.location_id ∈ locations; faction_id ∈ factions
            self.require_location(character.location_id.as_str())?;
            if let Some(faction_id) = &character.faction_id {
                self.require_faction(faction_id.as_str())?;
            }
        }

        for item in self.entities.items.values() {
            item.check_invariants()?;
            // 5. owner_id ∈ characters ∪ locations; location_id ∈ locations
            if let Some(owner_id) = &item.owner_id {
                let owned_by_character = self.entities.characters.contains_key(owner_id);
                let owned_by_location = self.entities.locations.contains_key(owner_id);
                if !owned_by_character && !owned_by_location {
                    return Err(CoreError::UnknownEntity {
                        kind: "character_or_location",
                        id: owner_id.clone(),
                    });
                }
            }
            if let Some(location_id) = &item.location_id {
                self.require_location(location_id.as_str())?;
            }
        }

        for location in self.entities.locations.values() {
            // 6. parent_location_id ∈ locations
            if let Some(parent_id) = &location.parent_location_id {
                self.require_location(parent_id.as_str())?;
            }
        }

        for faction in self.entities.factions.values() {
            // 7. leader_id ∈ characters; every member ∈ characters
            if let Some(leader_id) = &faction.leader_id {
                self.require_character(leader_id.as_str())?;
            }
            for member in &faction.members {
                self.require_character(member.as_str())?;
            }
        }

        Ok(())
    }

    fn require_location(&self, id: &str) -> Result<(), CoreError> {
        if self.entities.locations.contains_key(id) {
            Ok(())
        } else {
            Err(CoreError::UnknownEntity {
                kind: "location",
                id: id.to_string(),
            })
        }
    }

    fn require_character(&self, id: &str) -> Result<(), CoreError> {
        if self.entities.characters.contains_key(id) {
            Ok(())
        } else {
            Err(CoreError::UnknownEntity {
                kind: "character",
                id: id.to_string(),
            })
        }
    }

    fn require_item(&self, id: &str) -> Result<(), CoreError> {
        if self.entities.items.contains_key(id) {
            Ok(())
        } else {
            Err(CoreError::UnknownEntity {
                kind: "item",
                id: id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_has_no_invariant_violations() {
        let state = CanonicalState::initial(StoryId::new("story-1"), Timestamp::from_unix_seconds(0));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn item_requires_owner_or_location() {
        let item = Item {
            id: ItemId::new("seal_001"),
            name: "传国玉玺".to_string(),
            owner_id: None,
            location_id: None,
            unique: false,
            metadata: Metadata::new(),
        };
        assert!(item.check_invariants().is_err());
    }

    #[test]
    fn unique_item_requires_owner() {
        let item = Item {
            id: ItemId::new("seal_001"),
            name: "传国玉玺".to_string(),
            owner_id: None,
            location_id: Some(LocationId::new("luoyang")),
            unique: true,
            metadata: Metadata::new(),
        };
        assert!(item.check_invariants().is_err());
    }

    #[test]
    fn dangling_player_location_is_rejected() {
        let mut state = CanonicalState::initial(StoryId::new("story-1"), Timestamp::from_unix_seconds(0));
        state.player.location_id = LocationId::new("nowhere");
        assert!(state.check_invariants().is_err());
    }
}
