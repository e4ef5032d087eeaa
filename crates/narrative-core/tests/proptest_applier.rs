// crates/narrative-core/tests/proptest_applier.rs
// ============================================================================
// Module: Patch Applier Property-Based Tests
// Description: Property tests for apply/apply_many fold identity,
//              associativity, and idempotent field overwrite.
// Purpose: Detect panics and invariant breaks across generated event
//          batches rather than a fixed handful of example states.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use narrative_core::applier::apply;
use narrative_core::applier::apply_many;
use narrative_core::event::EntityKind;
use narrative_core::event::EntityUpdate;
use narrative_core::event::Event;
use narrative_core::event::EventTime;
use narrative_core::event::EventType;
use narrative_core::event::EventWhere;
use narrative_core::event::EventWho;
use narrative_core::event::Evidence;
use narrative_core::event::StatePatch;
use narrative_core::identifiers::EventId;
use narrative_core::identifiers::StoryId;
use narrative_core::state::CanonicalState;
use narrative_core::time::FixedClock;
use narrative_core::time::Timestamp;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn initial_state() -> CanonicalState {
    CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0))
}

fn clock_at(seconds: i64) -> FixedClock {
    FixedClock(Timestamp::from_unix_seconds(seconds))
}

/// Builds a travel event moving the player to `location_id`, named so every
/// generated event carries a distinct id (the only invariant the applier
/// itself cares about).
fn travel_event(turn: u64, location_id: &str, seq: u32) -> Event {
    let patch = StatePatch {
        entity_updates: BTreeMap::new(),
        player_updates: Some(narrative_core::event::PlayerUpdate {
            location_id: Some(narrative_core::identifiers::LocationId::new(location_id)),
            ..Default::default()
        }),
        ..Default::default()
    };
    Event::new(
        EventId::new(format!("evt_{turn}_{seq}")).unwrap(),
        turn,
        EventTime { label: format!("turn-{turn}"), order: u64::from(seq) },
        EventWhere::default(),
        EventWho::default(),
        EventType::Travel,
        "玩家移动",
        narrative_core::state::Metadata::new(),
        patch,
        Evidence { source: format!("draft_turn_{turn}"), text_span: None },
        Timestamp::from_unix_seconds(0),
    )
    .unwrap()
}

/// Builds an event that (re)names a single character, used to probe
/// idempotent field overwrite: applying the identical rename twice must
/// leave the character's name exactly as the first application left it.
fn rename_event(turn: u64, character_id: &str, name: &str, seq: u32) -> Event {
    let mut entity_updates = BTreeMap::new();
    entity_updates.insert(
        character_id.to_string(),
        EntityUpdate {
            entity_type: Some(EntityKind::Character),
            name: Some(name.to_string()),
            ..Default::default()
        },
    );
    let patch = StatePatch { entity_updates, ..Default::default() };
    Event::new(
        EventId::new(format!("evt_{turn}_{seq}")).unwrap(),
        turn,
        EventTime { label: format!("turn-{turn}"), order: u64::from(seq) },
        EventWhere::default(),
        EventWho::default(),
        EventType::Other,
        "角色改名",
        narrative_core::state::Metadata::new(),
        patch,
        Evidence { source: format!("draft_turn_{turn}"), text_span: None },
        Timestamp::from_unix_seconds(0),
    )
    .unwrap()
}

fn location_id_strategy() -> impl Strategy<Value = String> {
    "[a-z]{3,8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Folding an empty batch is a true no-op: `apply_many` never even
    /// enters its loop, so the returned state is bit-for-bit the input.
    #[test]
    fn apply_many_with_no_events_is_identity(seconds in 0i64..1_000_000) {
        let state = initial_state();
        let clock = clock_at(seconds);
        let next = apply_many(&state, &[], &clock).unwrap();
        prop_assert_eq!(next, state);
    }

    /// Folding a batch in one call equals folding a prefix, then folding the
    /// remaining suffix over the prefix's result.
    #[test]
    fn apply_many_is_associative_over_any_split(
        locations in prop::collection::vec(location_id_strategy(), 1..6),
        split in 0usize..6,
    ) {
        let split = split.min(locations.len());
        let state = initial_state();
        let clock = clock_at(500);
        let events: Vec<Event> = locations
            .iter()
            .enumerate()
            .map(|(i, loc)| travel_event(1, loc, i as u32))
            .collect();

        let whole = apply_many(&state, &events, &clock).unwrap();

        let (prefix, suffix) = events.split_at(split);
        let after_prefix = apply_many(&state, prefix, &clock).unwrap();
        let after_suffix = apply_many(&after_prefix, suffix, &clock).unwrap();

        prop_assert_eq!(whole, after_suffix);
    }

    /// Applying the same field-overwrite update twice in a row leaves the
    /// field exactly where the first application put it — merge semantics
    /// are idempotent for `Some`-valued scalar fields, not
    /// accumulating.
    #[test]
    fn repeated_identical_rename_is_idempotent(name in "[A-Za-z]{1,12}") {
        let state = initial_state();
        let clock = clock_at(1);
        let first_event = rename_event(1, "zhang_fei", &name, 0);
        let once = apply(&state, &first_event, &clock).unwrap();

        let second_event = rename_event(2, "zhang_fei", &name, 0);
        let twice = apply(&once, &second_event, &clock).unwrap();

        prop_assert_eq!(once.entities.characters.get("zhang_fei").unwrap().name.clone(), twice.entities.characters.get("zhang_fei").unwrap().name.clone());
        prop_assert_eq!(twice.entities.characters.get("zhang_fei").unwrap().name.clone(), name);
    }

    /// The applier never panics across an arbitrary sequence of travel
    /// destinations, and every destination ends up auto-materialised.
    #[test]
    fn travel_batches_never_panic_and_materialise_every_destination(
        locations in prop::collection::vec(location_id_strategy(), 0..12),
    ) {
        let state = initial_state();
        let clock = clock_at(42);
        let events: Vec<Event> = locations
            .iter()
            .enumerate()
            .map(|(i, loc)| travel_event(1, loc, i as u32))
            .collect();

        let next = apply_many(&state, &events, &clock).unwrap();
        for loc in &locations {
            prop_assert!(next.entities.locations.contains_key(loc));
        }
        prop_assert!(next.check_invariants().is_ok());
    }
}
