use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local mirror of an identity owned by the identity service.
///
/// Only the fields needed to scope workflow ownership are kept. Rows are
/// written by the identity event handler and by operator upserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub uuid: String,
    pub version: i64,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}
