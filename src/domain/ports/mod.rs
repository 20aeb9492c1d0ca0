//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that the surrounding system
//! must implement for the coordinator to run:
//! - `RecordStore`: conditional-write persistence for the shared state blob
//! - `ResultsIndex`: read access to per-model evaluation results
//! - `WorkCanceller`: best-effort cancellation of in-flight evaluations
//!
//! These traits define the contracts that keep the domain independent of
//! specific infrastructure implementations.

pub mod errors;
pub mod record_store;
pub mod results_index;
pub mod work_canceller;

pub use errors::StoreError;
pub use record_store::RecordStore;
pub use results_index::{ParticleInfo, ResultsIndex};
pub use work_canceller::{NullWorkCanceller, WorkCanceller};
