//! The shared search-state document.
//!
//! One `SearchState` exists per hyperparameter search. It is the single
//! point of contested state between worker processes and is synchronized
//! through full-document compare-and-swap against an external record store.
//! Workers treat it as an immutable value that is replaced wholesale on
//! every successful write, never merged field by field.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::swarm::{SprintState, SwarmEncoderState, SwarmId, SwarmStatus};

/// Full shared document describing the lifecycle of one search.
///
/// Maps and sets use BTree collections so serialization is canonical:
/// equal states produce byte-equal JSON, which the compare-and-swap
/// staleness check relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    /// Stamped on every successful write.
    pub last_update_time: DateTime<Utc>,
    /// Index of the last sprint that was not worse than its predecessors.
    /// Once set, no sprint beyond it is explored.
    pub last_good_sprint: Option<usize>,
    /// Whether the overall search has converged. Monotonic false -> true.
    pub search_over: bool,
    /// Derived cache of the currently active swarm ids.
    pub active_swarms: BTreeSet<SwarmId>,
    /// Every swarm ever created, keyed by canonical id.
    pub swarms: BTreeMap<SwarmId, SwarmEncoderState>,
    /// Sprint records; index equals generation.
    pub sprints: Vec<SprintState>,
    /// Encoders excluded from all future combinations.
    pub blacklisted_encoders: BTreeSet<String>,
}

impl SearchState {
    /// Empty state with no sprints yet.
    pub fn new() -> Self {
        Self {
            last_update_time: Utc::now(),
            last_good_sprint: None,
            search_over: false,
            active_swarms: BTreeSet::new(),
            swarms: BTreeMap::new(),
            sprints: Vec::new(),
            blacklisted_encoders: BTreeSet::new(),
        }
    }

    /// Register a new active swarm in the given sprint, growing the sprint
    /// list if the sprint does not exist yet.
    pub fn add_active_swarm(&mut self, swarm_id: SwarmId, sprint_idx: usize) {
        while self.sprints.len() <= sprint_idx {
            self.sprints.push(SprintState::active());
        }
        self.swarms
            .insert(swarm_id.clone(), SwarmEncoderState::active(sprint_idx));
        self.active_swarms.insert(swarm_id);
    }

    /// Rebuild the active-swarms cache from the swarm records.
    pub fn refresh_active_swarms(&mut self) {
        self.active_swarms = self
            .swarms
            .iter()
            .filter(|(_, info)| info.status == SwarmStatus::Active)
            .map(|(id, _)| id.clone())
            .collect();
    }

    /// Ids of all swarms belonging to a sprint.
    pub fn swarms_in_sprint(&self, sprint_idx: usize) -> Vec<SwarmId> {
        self.swarms
            .iter()
            .filter(|(_, info)| info.sprint_idx == sprint_idx)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of swarms in a sprint matching a status predicate.
    pub fn swarms_with_status(
        &self,
        sprint_idx: usize,
        pred: impl Fn(SwarmStatus) -> bool,
    ) -> Vec<SwarmId> {
        self.swarms
            .iter()
            .filter(|(_, info)| info.sprint_idx == sprint_idx && pred(info.status))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_active_swarm_grows_sprints() {
        let mut state = SearchState::new();
        state.add_active_swarm(SwarmId::from_encoders(["a"]), 0);
        state.add_active_swarm(SwarmId::from_encoders(["a", "b"]), 1);
        assert_eq!(state.sprints.len(), 2);
        assert_eq!(state.active_swarms.len(), 2);
        assert_eq!(
            state.swarms[&SwarmId::from_encoders(["a", "b"])].sprint_idx,
            1
        );
    }

    #[test]
    fn test_refresh_active_swarms() {
        let mut state = SearchState::new();
        let a = SwarmId::from_encoders(["a"]);
        let b = SwarmId::from_encoders(["b"]);
        state.add_active_swarm(a.clone(), 0);
        state.add_active_swarm(b.clone(), 0);
        state.swarms.get_mut(&a).unwrap().status = SwarmStatus::Completed;
        state.refresh_active_swarms();
        assert!(!state.active_swarms.contains(&a));
        assert!(state.active_swarms.contains(&b));
    }

    #[test]
    fn test_canonical_serialization_roundtrip() {
        let mut state = SearchState::new();
        state.add_active_swarm(SwarmId::from_encoders(["b", "a"]), 0);
        let text = serde_json::to_string(&state).unwrap();
        let parsed: SearchState = serde_json::from_str(&text).unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), text);
    }
}
