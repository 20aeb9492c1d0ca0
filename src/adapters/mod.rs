//! Infrastructure adapters implementing the domain ports.

pub mod memory;

pub use memory::{InMemoryRecordStore, InMemoryResultsIndex, RecordingWorkCanceller};
