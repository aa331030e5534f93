//! Workflow repository trait definition.

use flho_types::error::RepositoryError;
use flho_types::page::Filters;
use flho_types::workflow::Workflow;
use uuid::Uuid;

/// Storage for workflow definitions.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    /// Insert a new workflow. Returns it with the storage id assigned.
    fn insert(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<Workflow, RepositoryError>> + Send;

    /// Get a workflow by its external id.
    fn get(
        &self,
        unique_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// Persist metadata changes if the stored version still equals
    /// `workflow.version`, incrementing it by one.
    ///
    /// Returns `RepositoryError::Conflict` when the version moved on and
    /// `RepositoryError::NotFound` when the record is gone.
    fn update(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<Workflow, RepositoryError>> + Send;

    /// Delete by external id. Returns `true` if it existed.
    fn delete(
        &self,
        unique_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// One page of an owner's workflows plus the total matching count.
    ///
    /// `filters` is assumed to be validated against the sort safelist.
    fn list_by_owner(
        &self,
        owner: &str,
        filters: &Filters,
    ) -> impl std::future::Future<Output = Result<(Vec<Workflow>, u64), RepositoryError>> + Send;
}
