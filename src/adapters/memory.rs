//! In-memory adapters for the collaborator ports.
//!
//! The testing and single-process twin of the external record store and
//! results index. `InMemoryRecordStore` performs its conditional write
//! atomically under one lock, so several coordinator instances sharing an
//! `Arc` of it race exactly the way workers race against a real store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::SwarmId;
use crate::domain::ports::{ParticleInfo, RecordStore, ResultsIndex, StoreError, WorkCanceller};

/// Record store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    fields: Mutex<HashMap<(Uuid, String), String>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_field(&self, job_id: Uuid, field: &str) -> Result<Option<String>, StoreError> {
        let fields = self.fields.lock().await;
        Ok(fields.get(&(job_id, field.to_string())).cloned())
    }

    async fn set_field_if_equal(
        &self,
        job_id: Uuid,
        field: &str,
        new_value: &str,
        expected: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut fields = self.fields.lock().await;
        let key = (job_id, field.to_string());
        let current = fields.get(&key).map(String::as_str);
        if current != expected {
            return Ok(false);
        }
        fields.insert(key, new_value.to_string());
        Ok(true)
    }
}

/// Results index backed by a particle list. Tests script it by appending
/// particles; best-score queries are computed on the fly.
#[derive(Debug, Default)]
pub struct InMemoryResultsIndex {
    particles: Mutex<Vec<ParticleInfo>>,
}

impl InMemoryResultsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a particle evaluation.
    pub async fn add_particle(&self, info: ParticleInfo) {
        self.particles.lock().await.push(info);
    }

    /// Convenience: record a finished evaluation for a swarm.
    pub async fn add_result(&self, swarm_id: &SwarmId, model_id: &str, err_score: f64) {
        self.add_particle(ParticleInfo {
            model_id: model_id.to_string(),
            swarm_id: swarm_id.clone(),
            generation: 0,
            err_score: Some(err_score),
        })
        .await;
    }
}

#[async_trait]
impl ResultsIndex for InMemoryResultsIndex {
    async fn best_model_id_and_err_score(
        &self,
        swarm_id: &SwarmId,
    ) -> Result<(Option<String>, Option<f64>), StoreError> {
        let particles = self.particles.lock().await;
        let best = particles
            .iter()
            .filter(|p| &p.swarm_id == swarm_id)
            .filter_map(|p| p.err_score.map(|score| (p.model_id.clone(), score)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match best {
            Some((model_id, score)) => Ok((Some(model_id), Some(score))),
            None => Ok((None, None)),
        }
    }

    async fn particle_infos(
        &self,
        swarm_id: &SwarmId,
        matured: bool,
    ) -> Result<Vec<ParticleInfo>, StoreError> {
        let particles = self.particles.lock().await;
        Ok(particles
            .iter()
            .filter(|p| &p.swarm_id == swarm_id && (!matured || p.err_score.is_some()))
            .cloned()
            .collect())
    }

    async fn particle_info(&self, model_id: &str) -> Result<Option<ParticleInfo>, StoreError> {
        let particles = self.particles.lock().await;
        Ok(particles.iter().find(|p| p.model_id == model_id).cloned())
    }
}

/// Canceller that remembers which swarms were killed, for assertions.
#[derive(Debug, Default)]
pub struct RecordingWorkCanceller {
    killed: Mutex<Vec<SwarmId>>,
}

impl RecordingWorkCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swarms whose particles were asked to stop, in call order.
    pub async fn killed_swarms(&self) -> Vec<SwarmId> {
        self.killed.lock().await.clone()
    }
}

#[async_trait]
impl WorkCanceller for RecordingWorkCanceller {
    async fn kill_swarm_particles(&self, swarm_id: &SwarmId) -> Result<(), StoreError> {
        self.killed.lock().await.push(swarm_id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_field_if_equal_requires_match() {
        let store = InMemoryRecordStore::new();
        let job = Uuid::new_v4();

        // First write requires the field to be absent.
        assert!(store
            .set_field_if_equal(job, "state", "v1", None)
            .await
            .unwrap());
        // A second insert-if-absent loses.
        assert!(!store
            .set_field_if_equal(job, "state", "v2", None)
            .await
            .unwrap());
        // Update with the right expectation wins.
        assert!(store
            .set_field_if_equal(job, "state", "v2", Some("v1"))
            .await
            .unwrap());
        // A stale expectation loses.
        assert!(!store
            .set_field_if_equal(job, "state", "v3", Some("v1"))
            .await
            .unwrap());
        assert_eq!(
            store.get_field(job, "state").await.unwrap().as_deref(),
            Some("v2")
        );
    }

    #[tokio::test]
    async fn test_results_index_best_score() {
        let index = InMemoryResultsIndex::new();
        let swarm = SwarmId::from_encoders(["a"]);
        index.add_result(&swarm, "m1", 2.0).await;
        index.add_result(&swarm, "m2", 1.0).await;
        index.add_result(&swarm, "m3", 3.0).await;

        let (model, score) = index.best_model_id_and_err_score(&swarm).await.unwrap();
        assert_eq!(model.as_deref(), Some("m2"));
        assert_eq!(score, Some(1.0));

        let other = SwarmId::from_encoders(["b"]);
        let (model, score) = index.best_model_id_and_err_score(&other).await.unwrap();
        assert!(model.is_none());
        assert!(score.is_none());
    }

    #[tokio::test]
    async fn test_particle_infos_matured_filter() {
        let index = InMemoryResultsIndex::new();
        let swarm = SwarmId::from_encoders(["a"]);
        index.add_result(&swarm, "m1", 2.0).await;
        index
            .add_particle(ParticleInfo {
                model_id: "m2".to_string(),
                swarm_id: swarm.clone(),
                generation: 1,
                err_score: None,
            })
            .await;

        assert_eq!(index.particle_infos(&swarm, false).await.unwrap().len(), 2);
        assert_eq!(index.particle_infos(&swarm, true).await.unwrap().len(), 1);
    }
}
