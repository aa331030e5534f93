//! Operator writes to the identity mirror.
//!
//! Lets an operator register or deactivate an owner without an identity
//! service on the bus. The write goes through the same version guard as
//! event-driven updates, one version past whatever is stored.

use chrono::Utc;

use flho_types::error::FlowError;
use flho_types::identity::IdentityRecord;

use crate::repository::identity::IdentityRepository;

/// Upsert `uuid` with the given activation state and return the stored
/// record.
///
/// Fails with `EditConflict` when a newer version lands between the read
/// and the write.
pub async fn upsert_identity<I: IdentityRepository>(
    identities: &I,
    uuid: &str,
    active: bool,
) -> Result<IdentityRecord, FlowError> {
    let uuid = uuid.trim();
    if uuid.is_empty() {
        return Err(FlowError::InvalidArgument("identity uuid must be provided".into()));
    }

    let current = identities
        .get(uuid)
        .await
        .map_err(|e| FlowError::from_repository("identity", e))?;
    let record = IdentityRecord {
        uuid: uuid.to_string(),
        version: current.map_or(1, |c| c.version + 1),
        active,
        updated_at: Utc::now(),
    };

    let applied = identities
        .apply_if_newer(&record)
        .await
        .map_err(|e| FlowError::from_repository("identity", e))?;
    if !applied {
        return Err(FlowError::EditConflict);
    }

    tracing::info!(identity = %record.uuid, version = record.version, active, "identity registered by operator");
    Ok(record)
}
