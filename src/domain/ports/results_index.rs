//! Results-index port.
//!
//! The surrounding system owns an index of every model evaluated so far.
//! The coordinator only ever reads from it: best scores when a swarm
//! completes, particle counts for the speculative fullness check, and the
//! owning swarm of a given model.

use async_trait::async_trait;

use crate::domain::models::SwarmId;

use super::errors::StoreError;

/// Descriptor of one particle (a concrete parameter configuration) known
/// to the results index.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleInfo {
    /// Id of the model this particle produced.
    pub model_id: String,
    /// The swarm the particle belongs to.
    pub swarm_id: SwarmId,
    /// Generation the particle was evaluated in.
    pub generation: usize,
    /// Error score, if the evaluation finished.
    pub err_score: Option<f64>,
}

/// Port for the external results index.
#[async_trait]
pub trait ResultsIndex: Send + Sync {
    /// Best model id and error score recorded for a swarm so far. Either
    /// may be absent if nothing has been scored yet.
    async fn best_model_id_and_err_score(
        &self,
        swarm_id: &SwarmId,
    ) -> Result<(Option<String>, Option<f64>), StoreError>;

    /// Particle descriptors for a swarm. When `matured` is true, only
    /// particles that finished evaluating are returned.
    async fn particle_infos(
        &self,
        swarm_id: &SwarmId,
        matured: bool,
    ) -> Result<Vec<ParticleInfo>, StoreError>;

    /// Descriptor for a single model, or `None` if unknown.
    async fn particle_info(&self, model_id: &str) -> Result<Option<ParticleInfo>, StoreError>;
}
