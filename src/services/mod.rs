pub mod swarm_state_store;
pub mod swarm_terminator;

pub use swarm_state_store::SwarmStateStore;
pub use swarm_terminator::SwarmTerminator;
