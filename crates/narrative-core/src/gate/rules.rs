// crates/narrative-core/src/gate/rules.rs
// ============================================================================
// Module: Gate Rules
// Description: The ten pure rule functions consulted by the consistency gate.
// Purpose: Each rule is `fn(&CanonicalState, &CanonicalState, &[Event]) ->
//          Vec<RuleViolation>` — no dynamic dispatch, fixed registration
//          order in `gate::evaluate`.
// Dependencies: crate::{state, event}, super::{RuleId, RuleViolation, Severity}
// ============================================================================

//! ## Overview
//! Every rule here tolerates missing referenced entities by skipping rather
//! than panicking — a rule must never become a
//! source of a REWRITE loop by failing internally.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::event::Event;
use crate::event::EntityKind;
use crate::event::EventType;
use crate::event::StatePatch;
use crate::state::CanonicalState;
use crate::state::ConstraintType;

use super::RuleId;
use super::RuleViolation;
use super::Severity;

const MULTI_OWNERSHIP_MARKER: &str = "多重归属";
const DEAD_CHARACTER_MARKER: &str = "死亡角色";

// ============================================================================
// SECTION: R1 — Unique-Item Single Ownership
// ============================================================================

/// For each unique item id declared in `current_state.constraints`, rejects
/// a batch that assigns it more than one distinct owner.
pub fn r1_unique_item_single_ownership(
    current_state: &CanonicalState,
    _temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let unique_ids: BTreeSet<&str> = current_state
        .constraints
        .unique_item_ids
        .iter()
        .map(|id| id.as_str())
        .collect();

    let mut owners_by_item: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for event in pending_events {
        for (entity_id, update) in &event.state_patch.entity_updates {
            if !unique_ids.contains(entity_id.as_str()) {
                continue;
            }
            if let Some(Some(new_owner)) = &update.owner_id {
                owners_by_item
                    .entry(entity_id.as_str())
                    .or_default()
                    .insert(new_owner.clone());
            }
        }
    }

    owners_by_item
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .map(|(item_id, owners)| {
            let owners = owners.into_iter().collect::<Vec<_>>().join(", ");
            RuleViolation::new(
                RuleId::R1,
                Severity::Error,
                format!("物品 {item_id} {MULTI_OWNERSHIP_MARKER}: 同一批次内被分配给多个所有者 ({owners})"),
                Some(item_id.to_string()),
                false,
            )
        })
        .collect()
}

// ============================================================================
// SECTION: R2 — Item Position / Owner Coherence
// ============================================================================

/// Derives the location an item's current owner implies, if resolvable.
fn owner_implied_location(state: &CanonicalState, owner_id: &str) -> Option<crate::identifiers::LocationId> {
    if let Some(character) = state.entities.characters.get(owner_id) {
        return Some(character.location_id.clone());
    }
    if state.entities.locations.contains_key(owner_id) {
        return Some(crate::identifiers::LocationId::new(owner_id));
    }
    None
}

/// For every item in `temp_state` with an owner, its `location_id` must
/// track the owner's location. Mismatches are fixable warnings.
pub fn r2_item_position_owner_coherence(
    _current_state: &CanonicalState,
    temp_state: &CanonicalState,
    _pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for item in temp_state.entities.items.values() {
        let Some(owner_id) = &item.owner_id else {
            continue;
        };
        let Some(implied) = owner_implied_location(temp_state, owner_id) else {
            continue;
        };
        let matches = item.location_id.as_ref().is_some_and(|loc| loc == &implied);
        if !matches {
            violations.push(RuleViolation::new(
                RuleId::R2,
                Severity::Warning,
                format!(
                    "物品 {} 的位置与所有者 {} 的位置不一致，应为 {}",
                    item.id, owner_id, implied
                ),
                Some(item.id.as_str().to_string()),
                true,
            ));
        }
    }
    violations
}

/// Synthesises the `fixes` patch for an `AUTO_FIX` verdict: one
/// `location_id` correction per resolvable R2 warning.
pub fn synthesize_r2_fixes(warnings: &[&RuleViolation], temp_state: &CanonicalState) -> StatePatch {
    let mut patch = StatePatch::default();
    for warning in warnings {
        if warning.rule_id != RuleId::R2 {
            continue;
        }
        let Some(item_id) = &warning.entity_id else {
            continue;
        };
        let Some(item) = temp_state.entities.items.get(item_id) else {
            continue;
        };
        let Some(owner_id) = &item.owner_id else {
            continue;
        };
        let Some(corrected) = owner_implied_location(temp_state, owner_id) else {
            continue;
        };
        patch
            .entity_updates
            .insert(item_id.clone(), super::location_only_update(corrected));
    }
    patch
}

// ============================================================================
// SECTION: R3 — Dead Characters Cannot Act
// ============================================================================

/// Rejects a batch where a character already dead in `current_state` acts
/// as an event's actor (outside its own DEATH/REVIVAL), or is revived by a
/// non-REVIVAL event.
pub fn r3_dead_characters_cannot_act(
    current_state: &CanonicalState,
    _temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for event in pending_events {
        let subject_exempt = matches!(event.event_type, EventType::Death | EventType::Revival);
        if !subject_exempt {
            for actor_id in &event.who.actors {
                if let Some(character) = current_state.entities.characters.get(actor_id) {
                    if !character.alive {
                        violations.push(RuleViolation::new(
                            RuleId::R3,
                            Severity::Error,
                            format!("{DEAD_CHARACTER_MARKER} {} 不能作为事件的行动者", character.name),
                            Some(actor_id.clone()),
                            false,
                        ));
                    }
                }
            }
        }

        if event.event_type != EventType::Revival {
            for (entity_id, update) in &event.state_patch.entity_updates {
                if update.alive != Some(true) {
                    continue;
                }
                if let Some(character) = current_state.entities.characters.get(entity_id) {
                    if !character.alive {
                        violations.push(RuleViolation::new(
                            RuleId::R3,
                            Severity::Error,
                            format!(
                                "{DEAD_CHARACTER_MARKER} {} 的复生必须通过 REVIVAL 事件",
                                character.name
                            ),
                            Some(entity_id.clone()),
                            false,
                        ));
                    }
                }
            }
        }
    }
    violations
}

// ============================================================================
// SECTION: R4 — Explicit Event Type For Life/State Changes
// ============================================================================

/// Requires `DEATH`/`REVIVAL`/`FACTION_CHANGE` event types for the matching
/// field transitions.
pub fn r4_explicit_event_type_for_life_state_changes(
    _current_state: &CanonicalState,
    _temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for event in pending_events {
        for (entity_id, update) in &event.state_patch.entity_updates {
            if update.alive == Some(false) && event.event_type != EventType::Death {
                violations.push(RuleViolation::new(
                    RuleId::R4,
                    Severity::Error,
                    format!("将 {entity_id} 设为死亡需要 DEATH 事件类型，实际为 {:?}", event.event_type),
                    Some(entity_id.clone()),
                    false,
                ));
            }
            if update.alive == Some(true) && event.event_type != EventType::Revival {
                violations.push(RuleViolation::new(
                    RuleId::R4,
                    Severity::Error,
                    format!("将 {entity_id} 复生需要 REVIVAL 事件类型，实际为 {:?}", event.event_type),
                    Some(entity_id.clone()),
                    false,
                ));
            }
            if update.faction_id.is_some() && event.event_type != EventType::FactionChange {
                violations.push(RuleViolation::new(
                    RuleId::R4,
                    Severity::Error,
                    format!("更改 {entity_id} 的派系需要 FACTION_CHANGE 事件类型，实际为 {:?}", event.event_type),
                    Some(entity_id.clone()),
                    false,
                ));
            }
        }
    }
    violations
}

// ============================================================================
// SECTION: R5 — Location Changes Require TRAVEL
// ============================================================================

fn is_character_entity(state: &CanonicalState, entity_id: &str, update: &crate::event::EntityUpdate) -> bool {
    state.entities.characters.contains_key(entity_id) || update.entity_type == Some(EntityKind::Character)
}

/// Requires a `TRAVEL` event type for any character location change; when
/// the type is `TRAVEL`, `payload.character_id` (if present) must name the
/// character actually being moved.
pub fn r5_location_changes_require_travel(
    current_state: &CanonicalState,
    _temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for event in pending_events {
        for (entity_id, update) in &event.state_patch.entity_updates {
            if update.location_id.is_none() {
                continue;
            }
            if !is_character_entity(current_state, entity_id, update) {
                continue;
            }
            if event.event_type != EventType::Travel {
                violations.push(RuleViolation::new(
                    RuleId::R5,
                    Severity::Error,
                    format!("角色 {entity_id} 的位置变更需要 TRAVEL 事件类型，实际为 {:?}", event.event_type),
                    Some(entity_id.clone()),
                    false,
                ));
                continue;
            }
            if let Some(declared_actor) = event.payload_str("character_id") {
                if declared_actor != entity_id {
                    violations.push(RuleViolation::new(
                        RuleId::R5,
                        Severity::Error,
                        format!("TRAVEL 事件的 payload.character_id ({declared_actor}) 与被更新角色 ({entity_id}) 不一致"),
                        Some(entity_id.clone()),
                        false,
                    ));
                }
            }
        }
    }
    violations
}

// ============================================================================
// SECTION: R6 — Single Location Per Character At A Time
// ============================================================================

/// Groups the batch by `time.order` and rejects any group in which a
/// character is simultaneously asserted to be in more than one location.
pub fn r6_single_location_per_character(
    current_state: &CanonicalState,
    _temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut groups: BTreeMap<u64, Vec<&Event>> = BTreeMap::new();
    for event in pending_events {
        groups.entry(event.time.order).or_default().push(event);
    }

    let mut violations = Vec::new();
    for events in groups.values() {
        let mut locations: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut explicit: BTreeSet<String> = BTreeSet::new();

        for event in events {
            for (entity_id, update) in &event.state_patch.entity_updates {
                if !is_character_entity(current_state, entity_id, update) {
                    continue;
                }
                if let Some(location_id) = &update.location_id {
                    locations
                        .entry(entity_id.clone())
                        .or_default()
                        .insert(location_id.as_str().to_string());
                    explicit.insert(entity_id.clone());
                }
            }
        }

        for event in events {
            if event.event_type == EventType::Travel {
                continue;
            }
            let Some(location_id) = &event.where_.location_id else {
                continue;
            };
            for actor_id in &event.who.actors {
                if explicit.contains(actor_id) {
                    continue;
                }
                locations
                    .entry(actor_id.clone())
                    .or_default()
                    .insert(location_id.as_str().to_string());
            }
        }

        for (character_id, location_set) in locations {
            if location_set.len() > 1 {
                let locations = location_set.into_iter().collect::<Vec<_>>().join(", ");
                violations.push(RuleViolation::new(
                    RuleId::R6,
                    Severity::Error,
                    format!("角色 {character_id} 在同一时间点被断言位于多个地点: {locations}"),
                    Some(character_id),
                    false,
                ));
            }
        }
    }
    violations
}

// ============================================================================
// SECTION: R7 — Monotonic Timeline
// ============================================================================

/// Enforces that event time never runs backward relative to the committed
/// anchor, within the batch, or across the projected state.
pub fn r7_monotonic_timeline(
    current_state: &CanonicalState,
    temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    let floor = current_state.time.anchor.order;

    for event in pending_events {
        if event.time.order < floor {
            violations.push(RuleViolation::new(
                RuleId::R7,
                Severity::Error,
                format!(
                    "事件 {} 的时间顺序 {} 早于当前锚点 {floor}",
                    event.event_id, event.time.order
                ),
                None,
                false,
            ));
        }
    }

    for window in pending_events.windows(2) {
        let [earlier, later] = window else { continue };
        if earlier.turn == later.turn && earlier.time.order > later.time.order {
            violations.push(RuleViolation::new(
                RuleId::R7,
                Severity::Error,
                format!(
                    "同一回合内事件顺序错乱: {} (order={}) 先于 {} (order={})",
                    earlier.event_id, earlier.time.order, later.event_id, later.time.order
                ),
                None,
                false,
            ));
        }
    }

    if temp_state.time.anchor.order < floor {
        violations.push(RuleViolation::new(
            RuleId::R7,
            Severity::Error,
            format!("投影后的时间锚点 {} 早于当前锚点 {floor}", temp_state.time.anchor.order),
            None,
            false,
        ));
    }

    violations
}

// ============================================================================
// SECTION: R8 — Immutable Constraints Hold
// ============================================================================

fn constraint_predicate_holds(state: &CanonicalState, constraint: &crate::state::Constraint) -> bool {
    match constraint.kind {
        ConstraintType::EntityState => {
            let Some(entity_id) = &constraint.entity_id else {
                return true;
            };
            let Some(expected_alive) = constraint.value.get("alive").and_then(|v| v.as_bool()) else {
                return true;
            };
            state
                .entities
                .characters
                .get(entity_id)
                .is_none_or(|character| character.alive == expected_alive)
        }
        ConstraintType::Relationship => {
            let Some(entity_id) = &constraint.entity_id else {
                return true;
            };
            let Some(expected) = constraint.value.get("faction_id") else {
                return true;
            };
            let expected_faction = expected.as_str();
            state.entities.characters.get(entity_id).is_none_or(|character| {
                let actual = character.faction_id.as_ref().map(crate::identifiers::FactionId::as_str);
                actual == expected_faction
            })
        }
        ConstraintType::UniqueItem => {
            let Some(entity_id) = &constraint.entity_id else {
                return true;
            };
            let Some(expected_owner) = constraint.value.get("owner_id").and_then(|v| v.as_str()) else {
                return true;
            };
            state
                .entities
                .items
                .get(entity_id)
                .is_none_or(|item| item.owner_id.as_deref() == Some(expected_owner))
        }
        ConstraintType::ImmutableEvent => true,
    }
}

/// Checks every declared constraint's predicate still holds in the projected
/// state, and that no event in the batch reuses an immutable event id.
pub fn r8_immutable_constraints_hold(
    current_state: &CanonicalState,
    temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();

    for constraint in &current_state.constraints.constraints {
        if !constraint_predicate_holds(temp_state, constraint) {
            violations.push(RuleViolation::new(
                RuleId::R8,
                Severity::Error,
                format!("约束被违反: {}", constraint.description),
                constraint.entity_id.clone(),
                false,
            ));
        }
    }

    let immutable: BTreeSet<&str> = current_state
        .constraints
        .immutable_events
        .iter()
        .map(crate::identifiers::EventId::as_str)
        .collect();
    for event in pending_events {
        if immutable.contains(event.event_id.as_str()) {
            violations.push(RuleViolation::new(
                RuleId::R8,
                Severity::Error,
                format!("事件 {} 已被标记为不可变，不可再次提交", event.event_id),
                None,
                false,
            ));
        }
    }

    violations
}

// ============================================================================
// SECTION: R9 — Relationship Changes Are Traceable
// ============================================================================

/// Requires `FACTION_CHANGE` events to carry `payload.character_id`, and
/// requires any update touching `metadata.relationship_changes` to come
/// from a `RELATIONSHIP_CHANGE` event.
pub fn r9_relationship_changes_are_traceable(
    _current_state: &CanonicalState,
    _temp_state: &CanonicalState,
    pending_events: &[Event],
) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for event in pending_events {
        let touches_faction = event
            .state_patch
            .entity_updates
            .values()
            .any(|update| update.faction_id.is_some());
        if touches_faction && event.event_type == EventType::FactionChange && event.payload_str("character_id").is_none() {
            violations.push(RuleViolation::new(
                RuleId::R9,
                Severity::Error,
                "FACTION_CHANGE 事件缺少 payload.character_id".to_string(),
                None,
                false,
            ));
        }

        for (entity_id, update) in &event.state_patch.entity_updates {
            if update.metadata.contains_key("relationship_changes") && event.event_type != EventType::RelationshipChange {
                violations.push(RuleViolation::new(
                    RuleId::R9,
                    Severity::Error,
                    format!("对 {entity_id} 的 relationship_changes 元数据更新必须来自 RELATIONSHIP_CHANGE 事件"),
                    Some(entity_id.clone()),
                    false,
                ));
            }
        }
    }
    violations
}

// ============================================================================
// SECTION: R10 — Draft Fidelity
// ============================================================================

const DEATH_CUES: [&str; 6] = ["死亡", "死了", "去世", "逝世", "被杀", "被斩"];
const POSITION_CUES: [&str; 5] = ["在", "位于", "到达", "来到", "到了"];
const DEATH_CUE_WINDOW: usize = 50;

/// Scans raw draft text for cues that contradict `current_state`: a
/// known-alive character described with a death cue nearby, or a character
/// placed by a position cue at a location other than their current one.
/// Deliberately coarse; every hit is an error, not fixable.
pub fn r10_draft_fidelity(current_state: &CanonicalState, draft_text: &str) -> Vec<RuleViolation> {
    let chars: Vec<char> = draft_text.chars().collect();
    let mut violations = Vec::new();

    for character in current_state.entities.characters.values() {
        if !character.alive {
            continue;
        }
        for (start, _) in find_occurrences(&chars, &character.name) {
            let window_end = (start + character.name.chars().count() + DEATH_CUE_WINDOW).min(chars.len());
            let window_start = start.saturating_sub(DEATH_CUE_WINDOW);
            let window: String = chars[window_start..window_end].iter().collect();
            if DEATH_CUES.iter().any(|cue| window.contains(cue)) {
                violations.push(RuleViolation::new(
                    RuleId::R10,
                    Severity::Error,
                    format!("草稿提及 {} 死亡，但当前状态中该角色仍然存活", character.name),
                    Some(character.id.as_str().to_string()),
                    false,
                ));
            }
        }

        for sentence in split_sentences(draft_text) {
            if !sentence.contains(character.name.as_str()) {
                continue;
            }
            let Some(current_location) = current_state.entities.locations.get(character.location_id.as_str()) else {
                continue;
            };
            let has_position_cue = POSITION_CUES.iter().any(|cue| sentence.contains(cue));
            if !has_position_cue {
                continue;
            }
            for location in current_state.entities.locations.values() {
                if location.id == current_location.id {
                    continue;
                }
                if sentence.contains(location.name.as_str()) {
                    violations.push(RuleViolation::new(
                        RuleId::R10,
                        Severity::Error,
                        format!(
                            "草稿暗示 {} 位于 {}，但当前状态中该角色位于 {}",
                            character.name, location.name, current_location.name
                        ),
                        Some(character.id.as_str().to_string()),
                        false,
                    ));
                }
            }
        }
    }

    violations
}

fn find_occurrences(haystack: &[char], needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    let needle_chars: Vec<char> = needle.chars().collect();
    let mut hits = Vec::new();
    if needle_chars.len() > haystack.len() {
        return hits;
    }
    for start in 0..=(haystack.len() - needle_chars.len()) {
        if haystack[start..start + needle_chars.len()] == needle_chars[..] {
            hits.push((start, start + needle_chars.len()));
        }
    }
    hits
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['。', '！', '？', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EntityUpdate;
    use crate::event::EventTime;
    use crate::event::EventWhere;
    use crate::event::EventWho;
    use crate::event::Evidence;
    use crate::identifiers::CharacterId;
    use crate::identifiers::EventId;
    use crate::identifiers::FactionId;
    use crate::identifiers::ItemId;
    use crate::identifiers::LocationId;
    use crate::identifiers::StoryId;
    use crate::state::Character;
    use crate::state::Item;
    use crate::state::Metadata;
    use crate::time::Timestamp;
    use std::collections::BTreeMap;

    fn base_state() -> CanonicalState {
        let mut state = CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0));
        state.entities.locations.insert(
            "luoyang".to_string(),
            crate::state::Location {
                id: LocationId::new("luoyang"),
                name: "洛阳".to_string(),
                parent_location_id: None,
                metadata: Metadata::new(),
            },
        );
        state.entities.locations.insert(
            "xuchang".to_string(),
            crate::state::Location {
                id: LocationId::new("xuchang"),
                name: "许昌".to_string(),
                parent_location_id: None,
                metadata: Metadata::new(),
            },
        );
        state.entities.characters.insert(
            "caocao".to_string(),
            Character {
                id: CharacterId::new("caocao"),
                name: "曹操".to_string(),
                location_id: LocationId::new("luoyang"),
                alive: true,
                faction_id: Some(FactionId::new("wei")),
                metadata: Metadata::new(),
            },
        );
        state
    }

    fn event(event_type: EventType, patch: StatePatch, order: u64) -> Event {
        Event::new(
            EventId::new("evt_1_0_ffff0000").unwrap(),
            1,
            EventTime { label: "x".to_string(), order },
            EventWhere::default(),
            EventWho::default(),
            event_type,
            "summary",
            Metadata::new(),
            patch,
            Evidence { source: "draft_turn_1".to_string(), text_span: None },
            Timestamp::from_unix_seconds(0),
        )
        .unwrap()
    }

    #[test]
    fn r1_flags_two_owners_in_one_batch() {
        let mut state = base_state();
        let seal = ItemId::new("seal_001");
        state.constraints.unique_item_ids.push(seal.clone());
        state.entities.items.insert(
            "seal_001".to_string(),
            Item {
                id: seal,
                name: "传国玉玺".to_string(),
                owner_id: Some("caocao".to_string()),
                location_id: None,
                unique: true,
                metadata: Metadata::new(),
            },
        );

        let mut updates1 = BTreeMap::new();
        updates1.insert(
            "seal_001".to_string(),
            EntityUpdate { owner_id: Some(Some("liubei".to_string())), ..Default::default() },
        );
        let patch1 = StatePatch { entity_updates: updates1, ..Default::default() };

        let mut updates2 = BTreeMap::new();
        updates2.insert(
            "seal_001".to_string(),
            EntityUpdate { owner_id: Some(Some("player_001".to_string())), ..Default::default() },
        );
        let patch2 = StatePatch { entity_updates: updates2, ..Default::default() };

        let events = vec![
            event(EventType::OwnershipChange, patch1, 1),
            event(EventType::OwnershipChange, patch2, 1),
        ];
        let violations = r1_unique_item_single_ownership(&state, &state, &events);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entity_id.as_deref(), Some("seal_001"));
        assert!(violations[0].message.contains(MULTI_OWNERSHIP_MARKER));
    }

    #[test]
    fn r2_flags_mismatch_and_synthesizes_corrected_location() {
        let mut state = base_state();
        state.entities.characters.insert(
            "liubei".to_string(),
            Character {
                id: CharacterId::new("liubei"),
                name: "刘备".to_string(),
                location_id: LocationId::new("xuchang"),
                alive: true,
                faction_id: None,
                metadata: Metadata::new(),
            },
        );
        state.entities.items.insert(
            "sword_001".to_string(),
            Item {
                id: ItemId::new("sword_001"),
                name: "倚天剑".to_string(),
                owner_id: Some("liubei".to_string()),
                location_id: Some(LocationId::new("luoyang")),
                unique: false,
                metadata: Metadata::new(),
            },
        );

        let violations = r2_item_position_owner_coherence(&state, &state, &[]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entity_id.as_deref(), Some("sword_001"));
        assert!(violations[0].fixable);

        let refs: Vec<&RuleViolation> = violations.iter().collect();
        let fixes = synthesize_r2_fixes(&refs, &state);
        let item_fix = fixes.entity_updates.get("sword_001").expect("fix for sword_001");
        assert_eq!(item_fix.location_id.as_ref().map(crate::identifiers::LocationId::as_str), Some("xuchang"));
    }

    #[test]
    fn r3_flags_dead_actor() {
        let mut state = base_state();
        state.entities.characters.get_mut("caocao").unwrap().alive = false;
        let who = EventWho { actors: vec!["caocao".to_string()], witnesses: Vec::new() };
        let mut event = event(EventType::Other, StatePatch {
            player_updates: Some(crate::event::PlayerUpdate::default()),
            ..Default::default()
        }, 1);
        event.who = who;
        let violations = r3_dead_characters_cannot_act(&state, &state, std::slice::from_ref(&event));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("曹操"));
    }

    #[test]
    fn r5_flags_teleport_without_travel_type() {
        let state = base_state();
        let mut updates = BTreeMap::new();
        updates.insert(
            "caocao".to_string(),
            EntityUpdate { location_id: Some(LocationId::new("xuchang")), ..Default::default() },
        );
        let patch = StatePatch { entity_updates: updates, ..Default::default() };
        let events = vec![event(EventType::Other, patch, 1)];
        let violations = r5_location_changes_require_travel(&state, &state, &events);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn r5_allows_travel_with_matching_payload() {
        let state = base_state();
        let mut updates = BTreeMap::new();
        updates.insert(
            "caocao".to_string(),
            EntityUpdate { location_id: Some(LocationId::new("xuchang")), ..Default::default() },
        );
        let patch = StatePatch { entity_updates: updates, ..Default::default() };
        let mut payload = Metadata::new();
        payload.insert("character_id".to_string(), serde_json::json!("caocao"));
        let mut evt = event(EventType::Travel, patch, 1);
        evt.payload = payload;
        let violations = r5_location_changes_require_travel(&state, &state, &[evt]);
        assert!(violations.is_empty());
    }

    #[test]
    fn r6_flags_conflicting_locations_at_the_same_time_order() {
        let state = base_state();

        let mut updates_a = BTreeMap::new();
        updates_a.insert(
            "caocao".to_string(),
            EntityUpdate { location_id: Some(LocationId::new("xuchang")), ..Default::default() },
        );
        let event_a = event(EventType::Travel, StatePatch { entity_updates: updates_a, ..Default::default() }, 7);

        let mut updates_b = BTreeMap::new();
        updates_b.insert(
            "caocao".to_string(),
            EntityUpdate { location_id: Some(LocationId::new("luoyang")), ..Default::default() },
        );
        let event_b = event(EventType::Travel, StatePatch { entity_updates: updates_b, ..Default::default() }, 7);

        let violations = r6_single_location_per_character(&state, &state, &[event_a, event_b]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entity_id.as_deref(), Some("caocao"));
    }

    #[test]
    fn r6_allows_a_single_location_assertion_per_time_order() {
        let state = base_state();
        let mut updates = BTreeMap::new();
        updates.insert(
            "caocao".to_string(),
            EntityUpdate { location_id: Some(LocationId::new("xuchang")), ..Default::default() },
        );
        let events = vec![event(EventType::Travel, StatePatch { entity_updates: updates, ..Default::default() }, 7)];
        let violations = r6_single_location_per_character(&state, &state, &events);
        assert!(violations.is_empty());
    }

    #[test]
    fn r7_flags_time_rewind() {
        let mut state = base_state();
        state.time.anchor.order = 10;
        let events = vec![event(EventType::Other, StatePatch {
            player_updates: Some(crate::event::PlayerUpdate::default()),
            ..Default::default()
        }, 5)];
        let violations = r7_monotonic_timeline(&state, &state, &events);
        assert!(violations.iter().any(|v| v.message.contains('5')));
    }

    #[test]
    fn r8_flags_violation_of_a_declared_alive_constraint() {
        let mut state = base_state();
        state.constraints.constraints.push(crate::state::Constraint {
            id: crate::identifiers::ConstraintId::new("c1"),
            kind: ConstraintType::EntityState,
            description: "曹操必须存活".to_string(),
            entity_id: Some("caocao".to_string()),
            value: {
                let mut value = Metadata::new();
                value.insert("alive".to_string(), serde_json::json!(true));
                value
            },
        });
        let mut temp_state = state.clone();
        temp_state.entities.characters.get_mut("caocao").unwrap().alive = false;

        let violations = r8_immutable_constraints_hold(&state, &temp_state, &[]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entity_id.as_deref(), Some("caocao"));
    }

    #[test]
    fn r8_rejects_resubmission_of_an_immutable_event() {
        let mut state = base_state();
        let immutable_id = EventId::new("evt_1_0_ffff0000").unwrap();
        state.constraints.immutable_events.push(immutable_id);
        let events = vec![event(
            EventType::Other,
            StatePatch { player_updates: Some(crate::event::PlayerUpdate::default()), ..Default::default() },
            1,
        )];
        let violations = r8_immutable_constraints_hold(&state, &state, &events);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn r9_flags_faction_change_missing_character_id_payload() {
        let state = base_state();
        let mut updates = BTreeMap::new();
        updates.insert(
            "caocao".to_string(),
            EntityUpdate { faction_id: Some(Some(FactionId::new("shu"))), ..Default::default() },
        );
        let events = vec![event(EventType::FactionChange, StatePatch { entity_updates: updates, ..Default::default() }, 1)];
        let violations = r9_relationship_changes_are_traceable(&state, &state, &events);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn r10_flags_contradictory_death_cue() {
        let state = base_state();
        let draft = "曹操在洛阳的营帐中突然死亡，众人悲痛不已。";
        let violations = r10_draft_fidelity(&state, draft);
        assert!(!violations.is_empty());
    }
}
