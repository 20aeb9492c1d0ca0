//! Record-store port.
//!
//! The shared search-state document is persisted as a single text blob in
//! one field of an external job record. All synchronization between workers
//! goes through the conditional write below; there are no locks.

use async_trait::async_trait;
use uuid::Uuid;

use super::errors::StoreError;

/// Port for the external record store holding shared job fields.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the current value of a job field, or `None` if it was never
    /// written.
    async fn get_field(&self, job_id: Uuid, field: &str) -> Result<Option<String>, StoreError>;

    /// Conditionally set a job field.
    ///
    /// The write succeeds only if the field's current value equals
    /// `expected` (`None` meaning the field must not exist yet). Returns
    /// whether the write took effect. A `false` return is the normal
    /// lost-a-race outcome, not an error.
    async fn set_field_if_equal(
        &self,
        job_id: Uuid,
        field: &str,
        new_value: &str,
        expected: Option<&str>,
    ) -> Result<bool, StoreError>;
}
