// crates/narrative-core/src/applier.rs
// ============================================================================
// Module: Patch Applier
// Description: Deterministic, pure folding of events into canonical state.
// Purpose: Turn a batch of extracted events into the next canonical state
//          without ever touching wall-clock time or persistence directly.
// Dependencies: crate::{state, event, time, error}
// ============================================================================

//! ## Overview
//! [`apply`] takes an immutable `&CanonicalState` and one [`Event`] and
//! returns a new, owned `CanonicalState` — it never mutates its input in
//! place and never reads the system clock; the caller supplies `now` via a
//! [`Clock`]. [`apply_many`] folds a slice of events in order, which is
//! exactly what the gate's projection step and the commit step both
//! do, just against different inputs (a speculative scratch copy vs. the
//! real persisted state).

use crate::error::CoreError;
use crate::event::Event;
use crate::event::StatePatch;
use crate::state::Character;
use crate::state::CanonicalState;
use crate::state::Item;
use crate::state::Location;
use crate::state::Quest;
use crate::state::QuestStatus;
use crate::time::Clock;

// ============================================================================
// SECTION: Public Entry Points
// ============================================================================

/// Applies one event's `state_patch` to `state`, returning the next state.
///
/// # Errors
///
/// Currently infallible in practice — every effect section tolerates
/// missing referents per §4.1's failure semantics — but returns a
/// `Result` to keep the signature stable for future invariant checks and
/// to match [`apply_many`]'s short-circuiting contract.
pub fn apply(state: &CanonicalState, event: &Event, clock: &dyn Clock) -> Result<CanonicalState, CoreError> {
    let mut next = state.clone();
    apply_entity_updates(&mut next, &event.state_patch);
    apply_player_updates(&mut next, &event.state_patch);
    apply_time_update(&mut next, &event.state_patch);
    apply_quest_updates(&mut next, &event.state_patch);
    apply_constraint_additions(&mut next, &event.state_patch);
    materialise_referenced_locations(&mut next);
    next.meta.turn = next.meta.turn.max(event.turn);
    next.meta.last_event_id = Some(event.event_id.clone());
    next.meta.updated_at = clock.now();
    Ok(next)
}

/// Folds a slice of events into `state` in order, short-circuiting on the
/// first error.
///
/// # Errors
///
/// Propagates the first error from [`apply`].
pub fn apply_many(state: &CanonicalState, events: &[Event], clock: &dyn Clock) -> Result<CanonicalState, CoreError> {
    let mut current = state.clone();
    for event in events {
        current = apply(&current, event, clock)?;
    }
    Ok(current)
}

// ============================================================================
// SECTION: Entity Updates
// ============================================================================

fn apply_entity_updates(state: &mut CanonicalState, patch: &StatePatch) {
    for (entity_id, update) in &patch.entity_updates {
        apply_one_entity_update(state, entity_id, update);
    }
}

/// Applies a single entity update, dispatching by whichever entity map
/// already contains `entity_id`; for a brand-new id, dispatches by
/// `update.entity_type` when `update.name` is present. An update for an unknown id with no `name`, or a new id with no
/// `entity_type`, is a silent no-op.
fn apply_one_entity_update(state: &mut CanonicalState, entity_id: &str, update: &crate::event::EntityUpdate) {
    if let Some(character) = state.entities.characters.get_mut(entity_id) {
        merge_character(character, update);
        return;
    }
    if let Some(item) = state.entities.items.get_mut(entity_id) {
        merge_item(item, update);
        return;
    }
    if let Some(location) = state.entities.locations.get_mut(entity_id) {
        merge_location(location, update);
        return;
    }
    if let Some(faction) = state.entities.factions.get_mut(entity_id) {
        merge_faction(faction, update);
        return;
    }

    let (Some(name), Some(entity_type)) = (&update.name, update.entity_type) else {
        // Silent no-op: the extractor referenced an unknown entity without
        // supplying enough information to materialise one.
        return;
    };

    match entity_type {
        crate::event::EntityKind::Character => {
            let mut character = Character {
                id: crate::identifiers::CharacterId::new(entity_id),
                name: name.clone(),
                location_id: state.player.location_id.clone(),
                alive: true,
                faction_id: None,
                metadata: crate::state::Metadata::new(),
            };
            merge_character(&mut character, update);
            state.entities.characters.insert(entity_id.to_string(), character);
        }
        crate::event::EntityKind::Item => {
            let mut item = Item {
                id: crate::identifiers::ItemId::new(entity_id),
                name: name.clone(),
                owner_id: None,
                location_id: None,
                unique: update.unique.unwrap_or(false),
                metadata: crate::state::Metadata::new(),
            };
            merge_item(&mut item, update);
            state.entities.items.insert(entity_id.to_string(), item);
        }
        crate::event::EntityKind::Location => {
            let mut location = Location {
                id: crate::identifiers::LocationId::new(entity_id),
                name: name.clone(),
                parent_location_id: None,
                metadata: crate::state::Metadata::new(),
            };
            merge_location(&mut location, update);
            state.entities.locations.insert(entity_id.to_string(), location);
        }
        crate::event::EntityKind::Faction => {
            let mut faction = crate::state::Faction {
                id: crate::identifiers::FactionId::new(entity_id),
                name: name.clone(),
                leader_id: None,
                members: Vec::new(),
                metadata: crate::state::Metadata::new(),
            };
            merge_faction(&mut faction, update);
            state.entities.factions.insert(entity_id.to_string(), faction);
        }
    }
}

fn merge_character(character: &mut Character, update: &crate::event::EntityUpdate) {
    if let Some(name) = &update.name {
        character.name = name.clone();
    }
    if let Some(location_id) = &update.location_id {
        character.location_id = location_id.clone();
    }
    if let Some(alive) = update.alive {
        character.alive = alive;
    }
    if let Some(faction_id) = &update.faction_id {
        character.faction_id = faction_id.clone();
    }
    merge_metadata(&mut character.metadata, &update.metadata);
}

fn merge_item(item: &mut Item, update: &crate::event::EntityUpdate) {
    if let Some(name) = &update.name {
        item.name = name.clone();
    }
    if let Some(location_id) = &update.location_id {
        item.location_id = Some(location_id.clone());
    }
    if let Some(unique) = update.unique {
        item.unique = unique;
    }
    if let Some(owner_id) = &update.owner_id {
        item.owner_id = owner_id.clone();
        if owner_id.is_some() {
            item.location_id = None;
        }
    }
    merge_metadata(&mut item.metadata, &update.metadata);
}

fn merge_location(location: &mut Location, update: &crate::event::EntityUpdate) {
    if let Some(name) = &update.name {
        location.name = name.clone();
    }
    if let Some(parent_location_id) = &update.parent_location_id {
        location.parent_location_id = parent_location_id.clone();
    }
    merge_metadata(&mut location.metadata, &update.metadata);
}

fn merge_faction(faction: &mut crate::state::Faction, update: &crate::event::EntityUpdate) {
    if let Some(name) = &update.name {
        faction.name = name.clone();
    }
    if let Some(leader_id) = &update.leader_id {
        faction.leader_id = leader_id.clone();
    }
    for member in &update.members_add {
        if !faction.members.contains(member) {
            faction.members.push(member.clone());
        }
    }
    merge_metadata(&mut faction.metadata, &update.metadata);
}

fn merge_metadata(target: &mut crate::state::Metadata, incoming: &crate::state::Metadata) {
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
}

// ============================================================================
// SECTION: Player Updates
// ============================================================================

fn apply_player_updates(state: &mut CanonicalState, patch: &StatePatch) {
    let Some(update) = &patch.player_updates else {
        return;
    };
    if let Some(location_id) = &update.location_id {
        state.player.location_id = location_id.clone();
    }
    for member in &update.party_add {
        if !state.player.party.contains(member) {
            state.player.party.push(member.clone());
        }
    }
    state.player.party.retain(|m| !update.party_remove.contains(m));
    for item_id in &update.inventory_add {
        if !state.player.inventory.contains(item_id) {
            state.player.inventory.push(item_id.clone());
        }
    }
    state.player.inventory.retain(|i| !update.inventory_remove.contains(i));
}

// ============================================================================
// SECTION: Time Update
// ============================================================================

fn apply_time_update(state: &mut CanonicalState, patch: &StatePatch) {
    let Some(update) = &patch.time_update else {
        return;
    };
    if let Some(calendar) = &update.calendar {
        state.time.calendar = calendar.clone();
    }
    state.time.anchor.label = update.label.clone();
    state.time.anchor.order = update.order;
}

// ============================================================================
// SECTION: Quest Updates
// ============================================================================

/// Applies quest lifecycle transitions, reconciling `quest.active` and
/// `quest.completed` so that a quest never appears in both lists and a
/// `Completed`/`Failed` transition moves it out of `active`.
fn apply_quest_updates(state: &mut CanonicalState, patch: &StatePatch) {
    for update in &patch.quest_updates {
        let quest_id = update.quest_id.as_str();
        let existing_active_idx = state.quest.active.iter().position(|q| q.id.as_str() == quest_id);

        if let Some(idx) = existing_active_idx {
            let mut quest = state.quest.active[idx].clone();
            if let Some(title) = &update.title {
                quest.title = title.clone();
            }
            quest.status = update.status;
            match update.status {
                QuestStatus::Active => {
                    state.quest.active[idx] = quest;
                }
                QuestStatus::Completed | QuestStatus::Failed => {
                    state.quest.active.remove(idx);
                    state.quest.completed.push(quest);
                }
            }
            continue;
        }

        if state.quest.completed.iter().any(|q| q.id.as_str() == quest_id) {
            // Already resolved; a duplicate transition on a resolved quest
            // is a no-op here — the gate (R6) is responsible for flagging
            // this as a violation before it ever reaches the applier.
            continue;
        }

        // Brand-new quest: title defaults to the quest id itself when the
        // patch didn't supply one.
        let title = update.title.clone().unwrap_or_else(|| quest_id.to_string());
        let quest = Quest {
            id: update.quest_id.clone(),
            title,
            status: update.status,
            prerequisites: update.prerequisites.clone(),
            metadata: crate::state::Metadata::new(),
        };
        match update.status {
            QuestStatus::Active => state.quest.active.push(quest),
            QuestStatus::Completed | QuestStatus::Failed => state.quest.completed.push(quest),
        }
    }
}

// ============================================================================
// SECTION: Constraint Additions
// ============================================================================

fn apply_constraint_additions(state: &mut CanonicalState, patch: &StatePatch) {
    for addition in &patch.constraint_additions {
        if state.constraints.constraints.iter().any(|c| c.id == addition.id) {
            continue;
        }
        if addition.kind == crate::state::ConstraintType::UniqueItem {
            if let Some(entity_id) = &addition.entity_id {
                let item_id = crate::identifiers::ItemId::new(entity_id.clone());
                if !state.constraints.unique_item_ids.contains(&item_id) {
                    state.constraints.unique_item_ids.push(item_id);
                }
            }
        }
        state.constraints.constraints.push(crate::state::Constraint {
            id: addition.id.clone(),
            kind: addition.kind,
            description: addition.description.clone(),
            entity_id: addition.entity_id.clone(),
            value: addition.value.clone(),
        });
    }
}

// ============================================================================
// SECTION: Location Auto-Materialiser
// ============================================================================

/// After applying a patch, any location id referenced by the player, a
/// character, an item's `location_id`, or an item's `owner_id` that is
/// clearly not a character, but absent from `entities.locations`, is
/// materialised with `name == id`. This is the
/// only auto-creation permitted; missing characters/items/factions remain
/// errors. Exposed (not just called from [`apply`]) so `StateStore::load`
/// implementations can re-run it over states persisted before this
/// materialiser existed.
pub fn materialise_referenced_locations(state: &mut CanonicalState) {
    let mut referenced = Vec::new();
    referenced.push(state.player.location_id.clone());
    for character in state.entities.characters.values() {
        referenced.push(character.location_id.clone());
    }
    for item in state.entities.items.values() {
        if let Some(location_id) = &item.location_id {
            referenced.push(location_id.clone());
        }
        if let Some(owner_id) = &item.owner_id {
            if !state.entities.characters.contains_key(owner_id) {
                referenced.push(crate::identifiers::LocationId::new(owner_id.clone()));
            }
        }
    }
    for location_id in referenced {
        state
            .entities
            .locations
            .entry(location_id.as_str().to_string())
            .or_insert_with(|| Location {
                id: location_id.clone(),
                name: location_id.into_string(),
                parent_location_id: None,
                metadata: crate::state::Metadata::new(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EntityUpdate;
    use crate::event::EventType;
    use crate::event::PlayerUpdate;
    use crate::identifiers::EventId;
    use crate::identifiers::StoryId;
    use crate::time::FixedClock;
    use crate::time::Timestamp;
    use std::collections::BTreeMap;

    fn clock() -> FixedClock {
        FixedClock(Timestamp::from_unix_seconds(1_000))
    }

    fn make_event(id: &str, event_type: EventType, summary: &str, patch: StatePatch) -> Event {
        Event::new(
            EventId::new(id).unwrap(),
            1,
            crate::event::EventTime { label: "建安三年".to_string(), order: 3 },
            crate::event::EventWhere::default(),
            crate::event::EventWho::default(),
            event_type,
            summary,
            crate::state::Metadata::new(),
            patch,
            crate::event::Evidence { source: "draft_turn_1".to_string(), text_span: None },
            Timestamp::from_unix_seconds(0),
        )
        .unwrap()
    }

    #[test]
    fn player_travel_materialises_destination_location() {
        let state = CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0));
        let patch = StatePatch {
            player_updates: Some(PlayerUpdate {
                location_id: Some(crate::identifiers::LocationId::new("xuchang")),
                ..Default::default()
            }),
            ..Default::default()
        };
        let event = make_event("evt_1_0_aaaa1111", EventType::Travel, "玩家前往许昌", patch);
        let next = apply(&state, &event, &clock()).unwrap();
        assert_eq!(next.player.location_id.as_str(), "xuchang");
        assert!(next.entities.locations.contains_key("xuchang"));
        assert!(next.check_invariants().is_ok());
    }

    #[test]
    fn unknown_entity_update_without_name_is_noop() {
        let state = CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0));
        let mut entity_updates = BTreeMap::new();
        entity_updates.insert(
            "ghost".to_string(),
            EntityUpdate {
                alive: Some(false),
                ..Default::default()
            },
        );
        let patch = StatePatch {
            entity_updates,
            ..Default::default()
        };
        let event = make_event("evt_1_0_bbbb2222", EventType::Death, "某人死亡", patch);
        let next = apply(&state, &event, &clock()).unwrap();
        assert!(!next.entities.characters.contains_key("ghost"));
    }

    #[test]
    fn quest_completion_moves_quest_out_of_active() {
        let mut state = CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0));
        state.quest.active.push(Quest {
            id: crate::identifiers::QuestId::new("q1"),
            title: "寻找玉玺".to_string(),
            status: QuestStatus::Active,
            prerequisites: Vec::new(),
            metadata: crate::state::Metadata::new(),
        });
        let patch = StatePatch {
            quest_updates: vec![crate::event::QuestUpdate {
                quest_id: crate::identifiers::QuestId::new("q1"),
                title: None,
                status: QuestStatus::Completed,
                prerequisites: Vec::new(),
            }],
            ..Default::default()
        };
        let event = make_event("evt_1_0_cccc3333", EventType::QuestComplete, "任务完成", patch);
        let next = apply(&state, &event, &clock()).unwrap();
        assert!(next.quest.active.is_empty());
        assert_eq!(next.quest.completed.len(), 1);
    }
}
