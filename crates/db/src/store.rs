//! Store traits — the persistence contract the engine is written against.
//!
//! Guarded transitions (`suspend_run`, `finish_run`, `claim_suspended_run`,
//! `cancel_suspended_run`) and `next_cursor` must each be a single atomic
//! operation in every implementation: several workers may touch the same
//! run or cursor at once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AutomationPatch, AutomationRow, ExecutionRunRow, NewAutomation, NewRun, Page, RunStatus,
};
use crate::DbError;

#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn create_automation(&self, new: NewAutomation) -> Result<AutomationRow, DbError>;

    /// Returns [`DbError::NotFound`] for unknown ids.
    async fn get_automation(&self, id: Uuid) -> Result<AutomationRow, DbError>;

    /// All automations of a tenant, newest first.
    async fn list_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError>;

    /// Only the tenant's `is_active = true` automations.
    async fn list_active_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError>;

    async fn update_automation(
        &self,
        id: Uuid,
        patch: AutomationPatch,
    ) -> Result<AutomationRow, DbError>;

    /// Removes the automation together with its runs and cursors.
    async fn delete_automation(&self, id: Uuid) -> Result<(), DbError>;

    /// Bump `run_count` and set `last_run_at`.
    async fn record_automation_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbError>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a run in `running` status.
    async fn create_run(&self, new: NewRun) -> Result<ExecutionRunRow, DbError>;

    async fn get_run(&self, id: Uuid) -> Result<ExecutionRunRow, DbError>;

    /// Runs of one automation, newest first.
    async fn list_runs(&self, automation_id: Uuid, page: Page) -> Result<Vec<ExecutionRunRow>, DbError>;

    /// `running → suspended`, storing the continuation.
    /// [`DbError::Conflict`] when the run is not running.
    async fn suspend_run(
        &self,
        id: Uuid,
        resume_state: serde_json::Value,
        resume_at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// `running → completed | failed`. [`DbError::Conflict`] when the run
    /// is not running, so terminal rows are never rewritten.
    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<ExecutionRunRow, DbError>;

    /// Compare-and-swap `suspended → running`. `false` means someone else
    /// already claimed (or cancelled) the run.
    async fn claim_suspended_run(&self, id: Uuid) -> Result<bool, DbError>;

    /// Suspended runs whose `resume_at <= now`, oldest due first.
    async fn due_suspended_runs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExecutionRunRow>, DbError>;

    /// `suspended → failed` with message `cancelled`. `false` when the run
    /// was not suspended.
    async fn cancel_suspended_run(&self, id: Uuid) -> Result<bool, DbError>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Atomically read and increment the cursor for `(automation_id,
    /// node_id)`, returning the value *before* the increment. A missing
    /// cursor starts at zero.
    async fn next_cursor(&self, automation_id: Uuid, node_id: &str) -> Result<u64, DbError>;

    /// Current value without incrementing.
    async fn peek_cursor(&self, automation_id: Uuid, node_id: &str) -> Result<u64, DbError>;
}
