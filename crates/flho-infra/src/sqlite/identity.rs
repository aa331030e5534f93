//! SQLite identity mirror.
//!
//! Rows are only ever written by the identity event handler. An upsert is
//! skipped when the stored version is already at or past the incoming one.

use flho_core::repository::identity::IdentityRepository;
use flho_types::error::RepositoryError;
use flho_types::identity::IdentityRecord;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `IdentityRepository`.
#[derive(Clone)]
pub struct SqliteIdentityRepository {
    pool: DatabasePool,
}

impl SqliteIdentityRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_identity(row: &sqlx::sqlite::SqliteRow) -> Result<IdentityRecord, RepositoryError> {
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;
    Ok(IdentityRecord {
        uuid: row.try_get("uuid").map_err(query_error)?,
        version: row.try_get("version").map_err(query_error)?,
        active: row.try_get("active").map_err(query_error)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl IdentityRepository for SqliteIdentityRepository {
    async fn get(&self, uuid: &str) -> Result<Option<IdentityRecord>, RepositoryError> {
        let row = sqlx::query("SELECT uuid, version, active, updated_at FROM identities WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.as_ref().map(row_to_identity).transpose()
    }

    async fn apply_if_newer(&self, record: &IdentityRecord) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO identities (uuid, version, active, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(uuid) DO UPDATE SET
                 version = excluded.version,
                 active = excluded.active,
                 updated_at = excluded.updated_at
               WHERE excluded.version > identities.version"#,
        )
        .bind(&record.uuid)
        .bind(record.version)
        .bind(record.active)
        .bind(format_datetime(&record.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}
