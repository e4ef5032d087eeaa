// crates/narrative-core/tests/proptest_gate.rs
// ============================================================================
// Module: Consistency Gate Property-Based Tests
// Description: Property tests for gate determinism and never-panics over
//              generated event batches.
// Purpose: Confirm the gate's classification depends only on its inputs,
//          never on incidental ordering or process state.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use narrative_core::event::Event;
use narrative_core::event::EventTime;
use narrative_core::event::EventType;
use narrative_core::event::EventWhere;
use narrative_core::event::EventWho;
use narrative_core::event::Evidence;
use narrative_core::event::PlayerUpdate;
use narrative_core::event::StatePatch;
use narrative_core::gate;
use narrative_core::identifiers::EventId;
use narrative_core::identifiers::LocationId;
use narrative_core::identifiers::StoryId;
use narrative_core::state::CanonicalState;
use narrative_core::time::FixedClock;
use narrative_core::time::Timestamp;
use proptest::prelude::*;

fn initial_state() -> CanonicalState {
    CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0))
}

fn travel_event(seq: u32, location_id: &str) -> Event {
    let patch = StatePatch {
        player_updates: Some(PlayerUpdate {
            location_id: Some(LocationId::new(location_id)),
            ..Default::default()
        }),
        ..Default::default()
    };
    Event::new(
        EventId::new(format!("evt_1_{seq}")).unwrap(),
        1,
        EventTime { label: "turn-1".to_string(), order: u64::from(seq) },
        EventWhere::default(),
        EventWho::default(),
        EventType::Travel,
        "玩家移动",
        narrative_core::state::Metadata::new(),
        patch,
        Evidence { source: "draft_turn_1".to_string(), text_span: None },
        Timestamp::from_unix_seconds(0),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Re-running `evaluate` over the identical `(state, events)` pair
    /// twice produces the identical verdict — the gate consults nothing
    /// but its arguments.
    #[test]
    fn evaluate_is_deterministic_given_identical_inputs(
        locations in prop::collection::vec("[a-z]{3,8}", 0..8),
        clock_seconds in 0i64..1_000_000,
    ) {
        let state = initial_state();
        let clock = FixedClock(Timestamp::from_unix_seconds(clock_seconds));
        let events: Vec<Event> = locations
            .iter()
            .enumerate()
            .map(|(i, loc)| travel_event(i as u32, loc))
            .collect();

        let first = gate::evaluate(&state, &events, &clock);
        let second = gate::evaluate(&state, &events, &clock);
        prop_assert_eq!(first, second);
    }

    /// A batch of only-travel events with no referential-integrity issues
    /// always passes outright — travel alone never trips R1-R9.
    #[test]
    fn travel_only_batches_always_pass(
        locations in prop::collection::vec("[a-z]{3,8}", 0..8),
    ) {
        let state = initial_state();
        let clock = FixedClock(Timestamp::from_unix_seconds(10));
        let events: Vec<Event> = locations
            .iter()
            .enumerate()
            .map(|(i, loc)| travel_event(i as u32, loc))
            .collect();

        let result = gate::evaluate(&state, &events, &clock);
        prop_assert_eq!(result.action, Some(gate::Action::Pass));
        prop_assert!(result.violations.is_empty());
    }
}
