//! Postgres-backed store: thin trait adapters over the repository functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AutomationPatch, AutomationRow, ExecutionRunRow, NewAutomation, NewRun, Page, RunStatus,
};
use crate::repository::{automations, cursors, runs};
use crate::store::{AutomationStore, CursorStore, RunStore};
use crate::{DbError, DbPool};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl AutomationStore for PgStore {
    async fn create_automation(&self, new: NewAutomation) -> Result<AutomationRow, DbError> {
        automations::create_automation(&self.pool, new).await
    }

    async fn get_automation(&self, id: Uuid) -> Result<AutomationRow, DbError> {
        automations::get_automation(&self.pool, id).await
    }

    async fn list_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError> {
        automations::list_automations(&self.pool, tenant_id, false).await
    }

    async fn list_active_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError> {
        automations::list_automations(&self.pool, tenant_id, true).await
    }

    async fn update_automation(
        &self,
        id: Uuid,
        patch: AutomationPatch,
    ) -> Result<AutomationRow, DbError> {
        automations::update_automation(&self.pool, id, patch).await
    }

    async fn delete_automation(&self, id: Uuid) -> Result<(), DbError> {
        automations::delete_automation(&self.pool, id).await
    }

    async fn record_automation_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbError> {
        automations::record_run(&self.pool, id, at).await
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn create_run(&self, new: NewRun) -> Result<ExecutionRunRow, DbError> {
        runs::create_run(&self.pool, new).await
    }

    async fn get_run(&self, id: Uuid) -> Result<ExecutionRunRow, DbError> {
        runs::get_run(&self.pool, id).await
    }

    async fn list_runs(&self, automation_id: Uuid, page: Page) -> Result<Vec<ExecutionRunRow>, DbError> {
        runs::list_runs(&self.pool, automation_id, page).await
    }

    async fn suspend_run(
        &self,
        id: Uuid,
        resume_state: serde_json::Value,
        resume_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        runs::suspend_run(&self.pool, id, resume_state, resume_at).await
    }

    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<ExecutionRunRow, DbError> {
        runs::finish_run(&self.pool, id, status, error_message).await
    }

    async fn claim_suspended_run(&self, id: Uuid) -> Result<bool, DbError> {
        runs::claim_suspended_run(&self.pool, id).await
    }

    async fn due_suspended_runs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExecutionRunRow>, DbError> {
        runs::due_suspended_runs(&self.pool, now, limit).await
    }

    async fn cancel_suspended_run(&self, id: Uuid) -> Result<bool, DbError> {
        runs::cancel_suspended_run(&self.pool, id).await
    }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn next_cursor(&self, automation_id: Uuid, node_id: &str) -> Result<u64, DbError> {
        let value = cursors::next_cursor(&self.pool, automation_id, node_id).await?;
        u64::try_from(value).map_err(|_| DbError::Corrupt(format!("negative cursor {value}")))
    }

    async fn peek_cursor(&self, automation_id: Uuid, node_id: &str) -> Result<u64, DbError> {
        let value = cursors::peek_cursor(&self.pool, automation_id, node_id).await?;
        u64::try_from(value).map_err(|_| DbError::Corrupt(format!("negative cursor {value}")))
    }
}
