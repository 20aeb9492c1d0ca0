//! Hypersearch - Swarm Hyperparameter-Search Coordinator
//!
//! Hypersearch decides, across a pool of concurrent workers, which
//! combinations of input-encoding fields ("swarms") should be explored
//! next, when a combination should be abandoned, and when the overall
//! search has converged. Coordination is lock-free: the shared search
//! state is one document synchronized through full-document
//! compare-and-swap against an external record store.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture
//! principles:
//!
//! - **Domain Layer** (`domain`): Pure state records, configuration, and
//!   the port traits external collaborators must implement
//! - **Service Layer** (`services`): The shared lifecycle state machine
//!   (`SwarmStateStore`) and the early-termination tracker
//!   (`SwarmTerminator`)
//! - **Adapters** (`adapters`): In-memory port implementations for tests
//!   and single-process embedders
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use hypersearch::adapters::{InMemoryRecordStore, InMemoryResultsIndex};
//! use hypersearch::domain::models::{SearchConfig, SearchMode, SwarmStatus};
//! use hypersearch::domain::ports::NullWorkCanceller;
//! use hypersearch::services::SwarmStateStore;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SearchConfig::new(["consumption", "timestamp"], "consumption", SearchMode::Temporal);
//!     let mut store = SwarmStateStore::connect(
//!         Arc::new(InMemoryRecordStore::new()),
//!         Arc::new(InMemoryResultsIndex::new()),
//!         Arc::new(NullWorkCanceller::new()),
//!         Uuid::new_v4(),
//!         config,
//!     )
//!     .await?;
//!     let (active, _) = store.is_sprint_active(0).await?;
//!     assert!(active);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    SearchConfig, SearchMode, SearchState, SprintState, SwarmEncoderState, SwarmId, SwarmStatus,
    TerminatorConfig,
};
pub use domain::ports::{
    NullWorkCanceller, ParticleInfo, RecordStore, ResultsIndex, StoreError, WorkCanceller,
};
pub use domain::{SearchError, SearchResult};
pub use services::{SwarmStateStore, SwarmTerminator};
