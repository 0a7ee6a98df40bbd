//! Execution run repository functions.
//!
//! Every status transition is a guarded `UPDATE … WHERE status = …`, so the
//! row itself arbitrates between concurrent workers.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionRunRow, NewRun, Page, RunStatus},
};

const COLUMNS: &str = "id, automation_id, record_id, triggered_by, status, started_at, \
                       completed_at, error_message, resume_state, resume_at";

/// Create a new run record in `running` status.
pub async fn create_run(pool: &PgPool, new: NewRun) -> Result<ExecutionRunRow, DbError> {
    let row = sqlx::query_as::<_, ExecutionRunRow>(&format!(
        r#"
        INSERT INTO execution_runs (id, automation_id, record_id, triggered_by, status, started_at)
        VALUES ($1, $2, $3, $4, 'running', $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.automation_id)
    .bind(new.record_id)
    .bind(new.triggered_by)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<ExecutionRunRow, DbError> {
    sqlx::query_as::<_, ExecutionRunRow>(&format!("SELECT {COLUMNS} FROM execution_runs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// One page of an automation's runs, newest first.
pub async fn list_runs(
    pool: &PgPool,
    automation_id: Uuid,
    page: Page,
) -> Result<Vec<ExecutionRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionRunRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM execution_runs
        WHERE automation_id = $1
        ORDER BY started_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(automation_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// `running → suspended`, persisting the continuation in the same statement.
pub async fn suspend_run(
    pool: &PgPool,
    id: Uuid,
    resume_state: serde_json::Value,
    resume_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE execution_runs
        SET status = 'suspended', resume_state = $2, resume_at = $3
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(resume_state)
    .bind(resume_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::Conflict(format!("run {id} is not running")));
    }
    Ok(())
}

/// `running → completed | failed`. Terminal rows are left untouched.
pub async fn finish_run(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    error_message: Option<String>,
) -> Result<ExecutionRunRow, DbError> {
    sqlx::query_as::<_, ExecutionRunRow>(&format!(
        r#"
        UPDATE execution_runs
        SET status = $2, error_message = $3, completed_at = $4,
            resume_state = NULL, resume_at = NULL
        WHERE id = $1 AND status = 'running'
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(status.as_str())
    .bind(error_message)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::Conflict(format!("run {id} is not running")))
}

/// Compare-and-swap `suspended → running`; `true` when this caller won.
pub async fn claim_suspended_run(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE execution_runs SET status = 'running' WHERE id = $1 AND status = 'suspended'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Suspended runs whose resume time has elapsed, oldest first.
pub async fn due_suspended_runs(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ExecutionRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ExecutionRunRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM execution_runs
        WHERE status = 'suspended' AND resume_at <= $1
        ORDER BY resume_at ASC
        LIMIT $2
        "#
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// `suspended → failed` with message `cancelled`.
pub async fn cancel_suspended_run(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE execution_runs
        SET status = 'failed', error_message = 'cancelled', completed_at = $2,
            resume_state = NULL, resume_at = NULL
        WHERE id = $1 AND status = 'suspended'
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
