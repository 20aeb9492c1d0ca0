//! Property-based tests for swarm identity and lifecycle invariants.

use std::collections::BTreeSet;

use proptest::prelude::*;

use hypersearch::domain::models::{SearchState, SwarmId, SwarmStatus};

fn encoder_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

fn encoder_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(encoder_name(), 1..6)
}

fn any_status() -> impl Strategy<Value = SwarmStatus> {
    prop_oneof![
        Just(SwarmStatus::Active),
        Just(SwarmStatus::Completing),
        Just(SwarmStatus::Completed),
        Just(SwarmStatus::Killed),
        Just(SwarmStatus::Unset),
    ]
}

/// Lifecycle progress of a status. Transitions must never move backward.
fn rank(status: SwarmStatus) -> u8 {
    match status {
        SwarmStatus::Unset => 0,
        SwarmStatus::Active => 1,
        SwarmStatus::Completing => 2,
        SwarmStatus::Completed | SwarmStatus::Killed => 3,
    }
}

proptest! {
    /// The swarm id is canonical: supply order never matters.
    #[test]
    fn prop_swarm_id_is_order_invariant(mut encoders in encoder_list()) {
        let forward = SwarmId::from_encoders(encoders.clone());
        encoders.reverse();
        let backward = SwarmId::from_encoders(encoders);
        prop_assert_eq!(forward, backward);
    }

    /// The id round-trips to exactly the deduplicated encoder set.
    #[test]
    fn prop_swarm_id_preserves_encoder_set(encoders in encoder_list()) {
        let expected: BTreeSet<String> = encoders.iter().cloned().collect();
        let id = SwarmId::from_encoders(encoders);
        prop_assert_eq!(id.encoder_set(), expected);
        prop_assert_eq!(id.len(), id.encoder_set().len());
    }

    /// Extending never loses members and adds at most one.
    #[test]
    fn prop_extend_grows_by_at_most_one(encoders in encoder_list(), extra in encoder_name()) {
        let id = SwarmId::from_encoders(encoders);
        let extended = id.extend(&extra);
        prop_assert!(extended.is_superset_of(&id));
        prop_assert!(extended.contains(&extra));
        let expected_len = if id.contains(&extra) { id.len() } else { id.len() + 1 };
        prop_assert_eq!(extended.len(), expected_len);
    }

    /// Every allowed transition moves the lifecycle strictly forward, and
    /// terminal statuses allow none at all.
    #[test]
    fn prop_status_transitions_never_move_backward(from in any_status(), to in any_status()) {
        if from.can_transition_to(to) {
            prop_assert!(rank(to) > rank(from) || from == SwarmStatus::Unset);
            prop_assert!(!from.is_terminal());
        }
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    /// The shared document serializes canonically: one decode/encode cycle
    /// reproduces the exact bytes. Conditional writes compare documents by
    /// text, so any instability here would break coordination.
    #[test]
    fn prop_search_state_serialization_is_canonical(
        swarm_encoders in prop::collection::vec(encoder_list(), 1..5),
        scores in prop::collection::vec(0.0f64..1000.0, 1..5),
    ) {
        let mut state = SearchState::new();
        for (sprint_idx, encoders) in swarm_encoders.iter().enumerate() {
            state.add_active_swarm(SwarmId::from_encoders(encoders.clone()), sprint_idx);
        }
        for (info, score) in state.swarms.values_mut().zip(&scores) {
            info.status = SwarmStatus::Completed;
            info.best_model_id = Some(format!("model-{score}"));
            info.best_err_score = Some(*score);
        }
        state.refresh_active_swarms();

        let text = serde_json::to_string(&state).unwrap();
        let reparsed: SearchState = serde_json::from_str(&text).unwrap();
        let text_again = serde_json::to_string(&reparsed).unwrap();
        prop_assert_eq!(text, text_again);
        prop_assert_eq!(&reparsed, &state);
    }
}
