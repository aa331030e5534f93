//! SQLite run repository implementation.
//!
//! Runs reference their workflow by storage id; reads join `workflows` to
//! recover the external workflow id. Every write appends to
//! `run_transitions` inside the same transaction.

use chrono::Utc;
use flho_core::repository::run::RunRepository;
use flho_types::error::RepositoryError;
use flho_types::run::{Run, RunTransition, TransitionCause};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

const SELECT_RUN: &str = r#"SELECT r.id, r.unique_id, r.workflow_id, w.unique_id AS workflow_unique_id,
       r.step, r.version, r.created_at, r.updated_at
FROM runs r JOIN workflows w ON w.id = r.workflow_id"#;

/// SQLite-backed implementation of `RunRepository`.
#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: i64,
    unique_id: String,
    workflow_id: i64,
    workflow_unique_id: String,
    step: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            unique_id: row.try_get("unique_id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_unique_id: row.try_get("workflow_unique_id")?,
            step: row.try_get("step")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_run(self) -> Result<Run, RepositoryError> {
        Ok(Run {
            id: self.id,
            unique_id: parse_uuid(&self.unique_id)?,
            workflow_id: self.workflow_id,
            workflow_unique_id: parse_uuid(&self.workflow_unique_id)?,
            step: to_step(self.step)?,
            version: self.version,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct TransitionRow {
    run_id: i64,
    from_step: Option<i64>,
    to_step: i64,
    cause: String,
    created_at: String,
}

impl TransitionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            run_id: row.try_get("run_id")?,
            from_step: row.try_get("from_step")?,
            to_step: row.try_get("to_step")?,
            cause: row.try_get("cause")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_transition(self) -> Result<RunTransition, RepositoryError> {
        Ok(RunTransition {
            run_id: self.run_id,
            from_step: self.from_step.map(to_step).transpose()?,
            to_step: to_step(self.to_step)?,
            cause: self.cause.parse().map_err(RepositoryError::Query)?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn to_step(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Query(format!("invalid step: {value}")))
}

async fn insert_transition(
    conn: &mut sqlx::SqliteConnection,
    run_id: i64,
    from_step: Option<u32>,
    to_step: u32,
    cause: TransitionCause,
    at: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO run_transitions (run_id, from_step, to_step, cause, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(run_id)
    .bind(from_step.map(i64::from))
    .bind(i64::from(to_step))
    .bind(cause.as_str())
    .bind(at)
    .execute(conn)
    .await
    .map_err(query_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// RunRepository impl
// ---------------------------------------------------------------------------

impl RunRepository for SqliteRunRepository {
    async fn create(&self, run: &Run) -> Result<Run, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        let created_at = format_datetime(&run.created_at);

        let result = sqlx::query(
            r#"INSERT INTO runs (unique_id, workflow_id, step, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.unique_id.to_string())
        .bind(run.workflow_id)
        .bind(i64::from(run.step))
        .bind(run.version)
        .bind(&created_at)
        .bind(format_datetime(&run.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let id = result.last_insert_rowid();
        insert_transition(&mut *tx, id, None, run.step, TransitionCause::Start, &created_at).await?;
        tx.commit().await.map_err(query_error)?;

        let mut stored = run.clone();
        stored.id = id;
        Ok(stored)
    }

    async fn get(&self, unique_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_RUN} WHERE r.unique_id = ?"))
            .bind(unique_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = RunRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_run()?))
            }
            None => Ok(None),
        }
    }

    async fn update_step(
        &self,
        unique_id: &Uuid,
        expected_version: i64,
        step: u32,
    ) -> Result<Run, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let row = sqlx::query(&format!("{SELECT_RUN} WHERE r.unique_id = ?"))
            .bind(unique_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?
            .ok_or(RepositoryError::NotFound)?;
        let current = RunRow::from_row(&row).map_err(query_error)?.into_run()?;

        if current.version != expected_version {
            return Err(RepositoryError::Conflict(format!(
                "run {unique_id} is at version {}",
                current.version
            )));
        }

        let now = Utc::now();
        let at = format_datetime(&now);
        let result = sqlx::query(
            "UPDATE runs SET step = ?, version = version + 1, updated_at = ? WHERE id = ? AND version = ?",
        )
        .bind(i64::from(step))
        .bind(&at)
        .bind(current.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "run {unique_id} changed concurrently"
            )));
        }

        insert_transition(
            &mut *tx,
            current.id,
            Some(current.step),
            step,
            TransitionCause::Advance,
            &at,
        )
        .await?;
        tx.commit().await.map_err(query_error)?;

        Ok(Run {
            step,
            version: current.version + 1,
            updated_at: now,
            ..current
        })
    }

    async fn list(&self) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_RUN} ORDER BY r.id ASC"))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = RunRow::from_row(row).map_err(query_error)?;
            runs.push(r.into_run()?);
        }
        Ok(runs)
    }

    async fn history(&self, unique_id: &Uuid) -> Result<Vec<RunTransition>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT t.run_id, t.from_step, t.to_step, t.cause, t.created_at
               FROM run_transitions t JOIN runs r ON r.id = t.run_id
               WHERE r.unique_id = ?
               ORDER BY t.id ASC"#,
        )
        .bind(unique_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut transitions = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = TransitionRow::from_row(row).map_err(query_error)?;
            transitions.push(r.into_transition()?);
        }
        Ok(transitions)
    }
}
