//! Round-robin cursor operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Read-and-increment as a single upsert. The row lock taken by
/// `ON CONFLICT DO UPDATE` serialises concurrent callers, so every caller
/// sees a distinct pre-increment value.
pub async fn next_cursor(pool: &PgPool, automation_id: Uuid, node_id: &str) -> Result<i64, DbError> {
    let (previous,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO round_robin_cursors (automation_id, node_id, next_index)
        VALUES ($1, $2, 1)
        ON CONFLICT (automation_id, node_id)
        DO UPDATE SET next_index = round_robin_cursors.next_index + 1
        RETURNING next_index - 1
        "#,
    )
    .bind(automation_id)
    .bind(node_id)
    .fetch_one(pool)
    .await?;

    Ok(previous)
}

/// Current cursor value, zero when the node has never assigned.
pub async fn peek_cursor(pool: &PgPool, automation_id: Uuid, node_id: &str) -> Result<i64, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT next_index FROM round_robin_cursors WHERE automation_id = $1 AND node_id = $2",
    )
    .bind(automation_id)
    .bind(node_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(v,)| v).unwrap_or(0))
}
