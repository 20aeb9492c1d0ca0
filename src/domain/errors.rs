//! Domain errors for the hypersearch coordinator.

use thiserror::Error;

use crate::domain::ports::errors::StoreError;

/// Errors surfaced by the search coordinator.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Fatal configuration problem; the search should abort.
    #[error("Invalid search configuration: {0}")]
    InvalidConfig(String),

    /// A collaborator (record store, results index, canceller) failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The shared state document could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generation index ran past the configured milestone tolerances.
    /// Callers must supply enough milestones for the maximum expected
    /// generation count; there is no silent extrapolation.
    #[error(
        "Generation {generation} exceeds the configured milestone table ({available} entries)"
    )]
    MilestoneOverrun {
        /// Generation being judged.
        generation: usize,
        /// Number of configured milestone entries.
        available: usize,
    },

    /// A sprint index was requested that cannot exist yet.
    #[error("Sprint {requested} requested but only {existing} sprints exist")]
    SprintOutOfRange {
        /// Sprint index asked for.
        requested: usize,
        /// Number of sprints currently known.
        existing: usize,
    },

    /// A swarm id was referenced that the shared state does not know.
    #[error("Swarm not found: {0}")]
    SwarmNotFound(String),
}

/// Convenience alias used throughout the crate.
pub type SearchResult<T> = Result<T, SearchError>;
