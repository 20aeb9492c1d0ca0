//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hypersearch::adapters::{InMemoryRecordStore, InMemoryResultsIndex, RecordingWorkCanceller};
use hypersearch::domain::models::{SearchConfig, SearchMode, SwarmId};
use hypersearch::services::SwarmStateStore;

/// Install a test subscriber so `RUST_LOG` controls coordinator logging
/// during test runs. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// State store wired to the in-memory adapters.
pub type MemStateStore =
    SwarmStateStore<InMemoryRecordStore, InMemoryResultsIndex, RecordingWorkCanceller>;

/// One simulated search job: shared adapters plus its job id. Several
/// connected stores against the same harness behave like concurrent
/// workers.
pub struct Harness {
    pub record_store: Arc<InMemoryRecordStore>,
    pub results: Arc<InMemoryResultsIndex>,
    pub canceller: Arc<RecordingWorkCanceller>,
    pub job_id: Uuid,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            record_store: Arc::new(InMemoryRecordStore::new()),
            results: Arc::new(InMemoryResultsIndex::new()),
            canceller: Arc::new(RecordingWorkCanceller::new()),
            job_id: Uuid::new_v4(),
        }
    }

    /// Connect a worker's state store to this job.
    pub async fn connect(&self, config: SearchConfig) -> anyhow::Result<MemStateStore> {
        Ok(SwarmStateStore::connect(
            self.record_store.clone(),
            self.results.clone(),
            self.canceller.clone(),
            self.job_id,
            config,
        )
        .await?)
    }
}

/// Temporal search over encoders `a`, `b`, `c` predicting `a`.
pub fn temporal_config() -> SearchConfig {
    SearchConfig::new(["a", "b", "c"], "a", SearchMode::Temporal)
}

/// Shorthand for building a swarm id.
pub fn swarm(encoders: &[&str]) -> SwarmId {
    SwarmId::from_encoders(encoders.iter().copied())
}
