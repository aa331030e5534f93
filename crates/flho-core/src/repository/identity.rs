use flho_types::error::RepositoryError;
use flho_types::identity::IdentityRecord;

/// Local identity mirror, written only from identity lifecycle events.
pub trait IdentityRepository: Send + Sync {
    fn get(
        &self,
        uuid: &str,
    ) -> impl std::future::Future<Output = Result<Option<IdentityRecord>, RepositoryError>> + Send;

    /// Upsert `record` unless the stored version is already at or past
    /// `record.version`. Returns whether a write happened.
    fn apply_if_newer(
        &self,
        record: &IdentityRecord,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
