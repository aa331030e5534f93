//! Run repository trait definition.

use flho_types::error::RepositoryError;
use flho_types::run::{Run, RunTransition};
use uuid::Uuid;

/// Storage for runs and their transition history.
pub trait RunRepository: Send + Sync {
    /// Insert a new run and its `start` transition atomically.
    fn create(
        &self,
        run: &Run,
    ) -> impl std::future::Future<Output = Result<Run, RepositoryError>> + Send;

    /// Get a run by its external id.
    fn get(
        &self,
        unique_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Run>, RepositoryError>> + Send;

    /// Move a run to `step` if its stored version equals `expected_version`.
    ///
    /// Increments the version by one and appends an `advance` transition in
    /// the same write. A version mismatch yields `RepositoryError::Conflict`
    /// and leaves the row untouched.
    fn update_step(
        &self,
        unique_id: &Uuid,
        expected_version: i64,
        step: u32,
    ) -> impl std::future::Future<Output = Result<Run, RepositoryError>> + Send;

    /// Every persisted run, oldest first.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Transitions of one run, oldest first.
    fn history(
        &self,
        unique_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<RunTransition>, RepositoryError>> + Send;
}
