//! Work-canceller port.
//!
//! When a swarm transitions to killed, in-flight evaluations belonging to
//! it should stop. Cancellation is best effort; how it propagates to
//! running workers is the surrounding system's concern.

use async_trait::async_trait;

use crate::domain::models::SwarmId;

use super::errors::StoreError;

/// Port for cancelling in-flight work.
#[async_trait]
pub trait WorkCanceller: Send + Sync {
    /// Request that all running particle evaluations for a swarm stop.
    async fn kill_swarm_particles(&self, swarm_id: &SwarmId) -> Result<(), StoreError>;
}

/// A no-op canceller for embedders that have no running work to stop.
#[derive(Debug, Clone, Default)]
pub struct NullWorkCanceller;

impl NullWorkCanceller {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkCanceller for NullWorkCanceller {
    async fn kill_swarm_particles(&self, _swarm_id: &SwarmId) -> Result<(), StoreError> {
        Ok(())
    }
}
