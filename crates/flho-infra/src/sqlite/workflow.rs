//! SQLite workflow repository implementation.
//!
//! States and the breaker policy are stored as JSON text columns. Updates
//! are version compare-and-swap writes on the single writer connection.

use chrono::Utc;
use flho_core::repository::workflow::WorkflowRepository;
use flho_types::error::RepositoryError;
use flho_types::page::Filters;
use flho_types::workflow::{CircuitBreakerPolicy, State, Workflow};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `WorkflowRepository`.
#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: i64,
    unique_id: String,
    owner: String,
    name: String,
    states: String,
    circuit_breaker: Option<String>,
    active: bool,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            unique_id: row.try_get("unique_id")?,
            owner: row.try_get("owner")?,
            name: row.try_get("name")?,
            states: row.try_get("states")?,
            circuit_breaker: row.try_get("circuit_breaker")?,
            active: row.try_get("active")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        let states: Vec<State> = serde_json::from_str(&self.states)
            .map_err(|e| RepositoryError::Query(format!("invalid states JSON: {e}")))?;
        let circuit_breaker: Option<CircuitBreakerPolicy> = self
            .circuit_breaker
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid circuit breaker JSON: {e}")))
            })
            .transpose()?;

        Ok(Workflow {
            id: self.id,
            unique_id: parse_uuid(&self.unique_id)?,
            owner: self.owner,
            name: self.name,
            states,
            circuit_breaker,
            active: self.active,
            version: self.version,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn rows_into_workflows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Workflow>, RepositoryError> {
    let mut workflows = Vec::with_capacity(rows.len());
    for row in rows {
        let r = WorkflowRow::from_row(row).map_err(query_error)?;
        workflows.push(r.into_workflow()?);
    }
    Ok(workflows)
}

/// ORDER BY clause for a validated filter. The column is matched against
/// a fixed set so no caller text reaches the SQL.
fn order_clause(filters: &Filters) -> String {
    let column = match filters.sort_column() {
        "name" => "name",
        _ => "id",
    };
    format!("ORDER BY {column} {}, id ASC", filters.sort_direction().as_sql())
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn insert(&self, workflow: &Workflow) -> Result<Workflow, RepositoryError> {
        let states_json = serde_json::to_string(&workflow.states)
            .map_err(|e| RepositoryError::Query(format!("serialize states: {e}")))?;
        let breaker_json = workflow
            .circuit_breaker
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize circuit breaker: {e}")))?;

        let result = sqlx::query(
            r#"INSERT INTO workflows
               (unique_id, owner, name, states, circuit_breaker, active, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.unique_id.to_string())
        .bind(&workflow.owner)
        .bind(&workflow.name)
        .bind(&states_json)
        .bind(&breaker_json)
        .bind(workflow.active)
        .bind(workflow.version)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        let mut stored = workflow.clone();
        stored.id = result.last_insert_rowid();
        Ok(stored)
    }

    async fn get(&self, unique_id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE unique_id = ?")
            .bind(unique_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, workflow: &Workflow) -> Result<Workflow, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"UPDATE workflows
               SET name = ?, active = ?, version = version + 1, updated_at = ?
               WHERE unique_id = ? AND version = ?"#,
        )
        .bind(&workflow.name)
        .bind(workflow.active)
        .bind(format_datetime(&now))
        .bind(workflow.unique_id.to_string())
        .bind(workflow.version)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            // Tell a vanished record apart from a stale version.
            let current: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM workflows WHERE unique_id = ?")
                    .bind(workflow.unique_id.to_string())
                    .fetch_optional(&self.pool.writer)
                    .await
                    .map_err(query_error)?;
            return Err(match current {
                Some((version,)) => RepositoryError::Conflict(format!(
                    "workflow {} is at version {version}",
                    workflow.unique_id
                )),
                None => RepositoryError::NotFound,
            });
        }

        let mut stored = workflow.clone();
        stored.version += 1;
        stored.updated_at = now;
        Ok(stored)
    }

    async fn delete(&self, unique_id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE unique_id = ?")
            .bind(unique_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        filters: &Filters,
    ) -> Result<(Vec<Workflow>, u64), RepositoryError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflows WHERE owner = ?")
            .bind(owner)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let sql = format!(
            "SELECT * FROM workflows WHERE owner = ? {} LIMIT ? OFFSET ?",
            order_clause(filters)
        );
        let rows = sqlx::query(&sql)
            .bind(owner)
            .bind(filters.limit())
            .bind(filters.offset())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        Ok((rows_into_workflows(&rows)?, total.max(0) as u64))
    }
}
