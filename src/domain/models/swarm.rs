//! Swarm domain model.
//!
//! A swarm is a specific combination of input-encoding fields explored as a
//! unit. Swarms belong to sprints (generations of the search) and move
//! through a forward-only status lifecycle.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between encoder names in a canonical swarm id.
const SWARM_ID_SEPARATOR: char = '.';

/// Canonical identifier for a combination of encoder fields.
///
/// The id is the sorted, dot-joined list of participating encoder names, so
/// equal encoder sets always produce the same id regardless of the order
/// they were supplied in. The sort is a correctness invariant: swarm lookup
/// and duplicate detection both key on this string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwarmId(String);

impl SwarmId {
    /// Build a swarm id from a set of encoder names.
    pub fn from_encoders<I, S>(encoders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = encoders.into_iter().map(Into::into).collect();
        Self(
            names
                .into_iter()
                .collect::<Vec<_>>()
                .join(&SWARM_ID_SEPARATOR.to_string()),
        )
    }

    /// The encoder names participating in this swarm.
    pub fn encoders(&self) -> Vec<&str> {
        self.0.split(SWARM_ID_SEPARATOR).collect()
    }

    /// Owned set of encoder names, convenient for set algebra.
    pub fn encoder_set(&self) -> BTreeSet<String> {
        self.0
            .split(SWARM_ID_SEPARATOR)
            .map(ToString::to_string)
            .collect()
    }

    /// Number of encoder fields in the combination.
    pub fn len(&self) -> usize {
        self.0.split(SWARM_ID_SEPARATOR).count()
    }

    /// True when the id is empty (never the case for a constructed id).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when exactly one encoder participates.
    pub fn is_single_field(&self) -> bool {
        self.len() == 1
    }

    /// Whether this swarm includes the given encoder.
    pub fn contains(&self, encoder: &str) -> bool {
        self.0.split(SWARM_ID_SEPARATOR).any(|e| e == encoder)
    }

    /// Whether this swarm retains every encoder of `other`.
    pub fn is_superset_of(&self, other: &SwarmId) -> bool {
        let mine = self.encoder_set();
        other.encoders().iter().all(|e| mine.contains(*e))
    }

    /// New id with one more encoder added (normalizes ordering).
    pub fn extend(&self, encoder: &str) -> SwarmId {
        let mut set = self.encoder_set();
        set.insert(encoder.to_string());
        SwarmId::from_encoders(set)
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a swarm (or, in aggregate, of a sprint).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    /// Swarm is being actively explored by workers.
    Active,
    /// No more particles will be created; some are still evaluating.
    Completing,
    /// All particles finished; best model and score are recorded.
    Completed,
    /// Swarm was terminated early; its results are ignored.
    Killed,
    /// Placeholder before any state has been assigned.
    #[default]
    Unset,
}

impl SwarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Killed => "killed",
            Self::Unset => "unset",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Killed)
    }

    /// Valid transitions from this status. Transitions only move forward;
    /// a completed or killed swarm never changes again.
    pub fn valid_transitions(&self) -> Vec<SwarmStatus> {
        match self {
            Self::Unset => vec![Self::Active, Self::Completing, Self::Completed, Self::Killed],
            Self::Active => vec![Self::Completing, Self::Completed, Self::Killed],
            Self::Completing => vec![Self::Completed, Self::Killed],
            Self::Completed | Self::Killed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Per-swarm record in the shared search state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmEncoderState {
    /// Current lifecycle status.
    pub status: SwarmStatus,
    /// Best model found in this swarm; absent until completed.
    pub best_model_id: Option<String>,
    /// Error score of the best model; absent until completed.
    pub best_err_score: Option<f64>,
    /// Generation this swarm belongs to (index into the sprint list).
    pub sprint_idx: usize,
}

impl SwarmEncoderState {
    /// Fresh active swarm record for the given sprint.
    pub fn active(sprint_idx: usize) -> Self {
        Self {
            status: SwarmStatus::Active,
            best_model_id: None,
            best_err_score: None,
            sprint_idx,
        }
    }
}

/// Aggregate record describing a whole sprint. Same shape as a swarm
/// record: once every member swarm is done, the sprint carries the single
/// best model/score across all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintState {
    /// Aggregate status derived from member swarm statuses.
    pub status: SwarmStatus,
    /// Best model across all completed member swarms.
    pub best_model_id: Option<String>,
    /// Error score of the sprint's best model. Absent when the sprint
    /// completed without any finite-scored swarm; such a sprint compares
    /// as positive infinity.
    pub best_err_score: Option<f64>,
}

impl SprintState {
    /// Fresh active sprint record.
    pub fn active() -> Self {
        Self {
            status: SwarmStatus::Active,
            best_model_id: None,
            best_err_score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swarm_id_normalizes_order() {
        let a = SwarmId::from_encoders(["b", "a", "c"]);
        let b = SwarmId::from_encoders(["c", "b", "a"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "a.b.c");
    }

    #[test]
    fn test_swarm_id_deduplicates() {
        let id = SwarmId::from_encoders(["a", "a", "b"]);
        assert_eq!(id.as_str(), "a.b");
        assert_eq!(id.len(), 2);
    }

    #[test]
    fn test_swarm_id_extend() {
        let id = SwarmId::from_encoders(["c", "a"]);
        let extended = id.extend("b");
        assert_eq!(extended.as_str(), "a.b.c");
        // Extending with an existing member is a no-op
        assert_eq!(id.extend("a"), id);
    }

    #[test]
    fn test_swarm_id_superset() {
        let small = SwarmId::from_encoders(["a", "b"]);
        let big = SwarmId::from_encoders(["a", "b", "c"]);
        assert!(big.is_superset_of(&small));
        assert!(!small.is_superset_of(&big));
        assert!(small.is_superset_of(&small));
    }

    #[test]
    fn test_status_transitions_forward_only() {
        assert!(SwarmStatus::Active.can_transition_to(SwarmStatus::Completing));
        assert!(SwarmStatus::Active.can_transition_to(SwarmStatus::Completed));
        assert!(SwarmStatus::Active.can_transition_to(SwarmStatus::Killed));
        assert!(SwarmStatus::Completing.can_transition_to(SwarmStatus::Completed));
        assert!(!SwarmStatus::Completing.can_transition_to(SwarmStatus::Active));
        assert!(!SwarmStatus::Completed.can_transition_to(SwarmStatus::Completing));
        assert!(!SwarmStatus::Killed.can_transition_to(SwarmStatus::Active));
        assert!(SwarmStatus::Completed.is_terminal());
    }
}
