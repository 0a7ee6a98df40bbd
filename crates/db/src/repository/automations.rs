//! Automation CRUD operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{AutomationPatch, AutomationRow, NewAutomation},
};

const COLUMNS: &str = "id, tenant_id, name, description, is_active, is_draft, workflow_graph, \
                       run_count, last_run_at, created_at, updated_at";

/// Insert a new automation.
pub async fn create_automation(pool: &PgPool, new: NewAutomation) -> Result<AutomationRow, DbError> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, AutomationRow>(&format!(
        r#"
        INSERT INTO automations
            (id, tenant_id, name, description, is_active, is_draft, workflow_graph,
             run_count, last_run_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, NULL, $8, $8)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.tenant_id)
    .bind(new.name)
    .bind(new.description)
    .bind(new.is_active)
    .bind(new.is_draft)
    .bind(new.workflow_graph)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single automation by its primary key.
pub async fn get_automation(pool: &PgPool, id: Uuid) -> Result<AutomationRow, DbError> {
    sqlx::query_as::<_, AutomationRow>(&format!("SELECT {COLUMNS} FROM automations WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// All automations of a tenant, newest first. `active_only` restricts the
/// listing to `is_active = true`.
pub async fn list_automations(
    pool: &PgPool,
    tenant_id: Uuid,
    active_only: bool,
) -> Result<Vec<AutomationRow>, DbError> {
    let rows = sqlx::query_as::<_, AutomationRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM automations
        WHERE tenant_id = $1 AND (is_active OR NOT $2)
        ORDER BY created_at DESC
        "#
    ))
    .bind(tenant_id)
    .bind(active_only)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Apply a partial update; untouched columns keep their value.
pub async fn update_automation(
    pool: &PgPool,
    id: Uuid,
    patch: AutomationPatch,
) -> Result<AutomationRow, DbError> {
    sqlx::query_as::<_, AutomationRow>(&format!(
        r#"
        UPDATE automations SET
            name           = COALESCE($2, name),
            description    = COALESCE($3, description),
            workflow_graph = COALESCE($4, workflow_graph),
            is_active      = COALESCE($5, is_active),
            is_draft       = COALESCE($6, is_draft),
            updated_at     = $7
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(patch.name)
    .bind(patch.description)
    .bind(patch.workflow_graph)
    .bind(patch.is_active)
    .bind(patch.is_draft)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Permanently delete an automation. Runs and cursors go with it
/// (`ON DELETE CASCADE`).
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_automation(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM automations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Bump the run counter in one statement.
pub async fn record_run(pool: &PgPool, id: Uuid, at: DateTime<Utc>) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE automations SET run_count = run_count + 1, last_run_at = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
