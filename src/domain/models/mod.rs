pub mod config;
pub mod search_state;
pub mod swarm;

pub use config::{SearchConfig, SearchMode, TerminatorConfig};
pub use search_state::SearchState;
pub use swarm::{SprintState, SwarmEncoderState, SwarmId, SwarmStatus};
