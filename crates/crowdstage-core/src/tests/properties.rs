//! Property tests for the order-tolerance and election guarantees.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::json;
use wirestore::{ChildEvent, Store};

use crate::input::InputState;
use crate::name::sanitize_name;
use crate::reconcile::Reconciler;
use crate::stage::ArcadeStage;
use crate::tests::helpers::start_screen;

/// The shape of one generated remote update, before it is wrapped in an
/// event variant.
#[derive(Debug, Clone)]
struct GenRecord {
    name: String,
    input: InputState,
}

fn record_strategy() -> impl Strategy<Value = GenRecord> {
    (
        "[A-Za-z ]{0,14}",
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(name, left, right, jump)| GenRecord {
            name,
            input: InputState { left, right, jump },
        })
}

fn event_strategy() -> impl Strategy<Value = ChildEvent> {
    let key = prop::sample::select(vec!["ka", "kb", "kc", "kd"]);
    (key, 0..3u8, record_strategy()).prop_map(|(key, kind, record)| {
        let value = json!({
            "name": record.name,
            "input": record.input,
            "joinedAt": 1,
        });
        match kind {
            0 => ChildEvent::Added {
                key: key.to_string(),
                value,
            },
            1 => ChildEvent::Changed {
                key: key.to_string(),
                value,
            },
            _ => ChildEvent::Removed {
                key: key.to_string(),
            },
        }
    })
}

/// Folds the same event sequence the reference way: a key exists iff its
/// last event was not a removal, and carries that event's record.
fn reference_fold(events: &[ChildEvent]) -> BTreeMap<String, (String, InputState)> {
    let mut expected = BTreeMap::new();
    for event in events {
        match event {
            ChildEvent::Added { key, value } | ChildEvent::Changed { key, value } => {
                let name = sanitize_name(value["name"].as_str().unwrap_or(""));
                let input = serde_json::from_value(value["input"].clone()).unwrap_or_default();
                expected.insert(key.clone(), (name, input));
            }
            ChildEvent::Removed { key } => {
                expected.remove(key);
            }
        }
    }
    expected
}

proptest! {
    /// Whatever the interleaving of adds, changes, and removals, the actor
    /// set ends up holding exactly the keys whose last event was not a
    /// removal, each carrying that event's record.
    #[test]
    fn actor_set_converges_to_the_latest_records(
        events in prop::collection::vec(event_strategy(), 0..48),
    ) {
        let mut stage = ArcadeStage::new();
        let mut rec = Reconciler::new(11);
        for event in &events {
            rec.apply(event.clone(), &mut stage);
        }

        let expected = reference_fold(&events);
        prop_assert_eq!(rec.actors().len(), expected.len());
        prop_assert_eq!(stage.body_count(), expected.len());
        for (key, (name, input)) in &expected {
            let actor = &rec.actors()[key];
            prop_assert_eq!(&actor.name, name);
            prop_assert_eq!(&actor.input, input);
        }
    }

    /// Replaying the effective final record of every surviving key (the
    /// at-least-once case) leaves the actor set untouched, including the
    /// body handles.
    #[test]
    fn replaying_final_records_is_idempotent(
        events in prop::collection::vec(event_strategy(), 1..48),
    ) {
        let mut stage = ArcadeStage::new();
        let mut rec = Reconciler::new(11);
        for event in &events {
            rec.apply(event.clone(), &mut stage);
        }
        let bodies: BTreeMap<String, _> = rec
            .actors()
            .iter()
            .map(|(key, actor)| (key.clone(), actor.body))
            .collect();

        for (key, (name, input)) in reference_fold(&events) {
            rec.apply(
                ChildEvent::Added {
                    key,
                    value: json!({ "name": name, "input": input, "joinedAt": 1 }),
                },
                &mut stage,
            );
        }

        prop_assert_eq!(rec.actors().len(), bodies.len());
        for (key, body) in &bodies {
            prop_assert_eq!(&rec.actors()[key].body, body, "replay must not respawn");
        }
    }

    /// However contender pumps interleave, at most one screen ever holds
    /// the claim, and once everyone has caught up exactly one does.
    #[test]
    fn elections_settle_on_exactly_one_winner(
        contenders in 1usize..5,
        schedule in prop::collection::vec(0usize..5, 0..24),
    ) {
        let store = Store::new();
        let mut screens: Vec<_> = (0..contenders)
            .map(|seed| start_screen(&store, seed as u64))
            .collect();

        for slot in schedule {
            screens[slot % contenders].pump();
            let winners = screens.iter().filter(|s| s.is_authoritative()).count();
            prop_assert!(winners <= 1, "two screens claimed the room at once");
        }

        // Let every contender process the final claim snapshot.
        for _ in 0..2 {
            for screen in &mut screens {
                screen.pump();
            }
        }
        let winners = screens.iter().filter(|s| s.is_authoritative()).count();
        prop_assert_eq!(winners, 1);
    }
}
