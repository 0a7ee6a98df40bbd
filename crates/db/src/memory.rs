//! In-memory implementation of every store trait.
//!
//! All state sits behind one mutex, so each trait method is atomic with
//! respect to the others — the same guarantees the Postgres statements give.
//! Nothing survives the process; share one `Arc<MemoryStore>` between
//! executor instances to simulate a restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AutomationPatch, AutomationRow, ExecutionRunRow, NewAutomation, NewRun, Page, RunStatus,
};
use crate::store::{AutomationStore, CursorStore, RunStore};
use crate::DbError;

#[derive(Default)]
struct Inner {
    /// Insertion order is creation order.
    automations: Vec<AutomationRow>,
    runs: Vec<ExecutionRunRow>,
    cursors: HashMap<(Uuid, String), u64>,
}

impl Inner {
    fn automation_mut(&mut self, id: Uuid) -> Result<&mut AutomationRow, DbError> {
        self.automations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(DbError::NotFound)
    }

    fn run_mut(&mut self, id: Uuid) -> Result<&mut ExecutionRunRow, DbError> {
        self.runs.iter_mut().find(|r| r.id == id).ok_or(DbError::NotFound)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AutomationStore for MemoryStore {
    async fn create_automation(&self, new: NewAutomation) -> Result<AutomationRow, DbError> {
        let now = Utc::now();
        let row = AutomationRow {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            name: new.name,
            description: new.description,
            is_active: new.is_active,
            is_draft: new.is_draft,
            workflow_graph: new.workflow_graph,
            run_count: 0,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().automations.push(row.clone());
        Ok(row)
    }

    async fn get_automation(&self, id: Uuid) -> Result<AutomationRow, DbError> {
        self.lock()
            .automations
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn list_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError> {
        Ok(self
            .lock()
            .automations
            .iter()
            .rev()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_active_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError> {
        Ok(self
            .lock()
            .automations
            .iter()
            .rev()
            .filter(|a| a.tenant_id == tenant_id && a.is_active)
            .cloned()
            .collect())
    }

    async fn update_automation(
        &self,
        id: Uuid,
        patch: AutomationPatch,
    ) -> Result<AutomationRow, DbError> {
        let mut inner = self.lock();
        let row = inner.automation_mut(id)?;
        patch.apply(row, Utc::now());
        Ok(row.clone())
    }

    async fn delete_automation(&self, id: Uuid) -> Result<(), DbError> {
        let mut inner = self.lock();
        let before = inner.automations.len();
        inner.automations.retain(|a| a.id != id);
        if inner.automations.len() == before {
            return Err(DbError::NotFound);
        }
        inner.runs.retain(|r| r.automation_id != id);
        inner.cursors.retain(|(automation_id, _), _| *automation_id != id);
        Ok(())
    }

    async fn record_automation_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbError> {
        let mut inner = self.lock();
        let row = inner.automation_mut(id)?;
        row.run_count += 1;
        row.last_run_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, new: NewRun) -> Result<ExecutionRunRow, DbError> {
        let row = ExecutionRunRow {
            id: Uuid::new_v4(),
            automation_id: new.automation_id,
            record_id: new.record_id,
            triggered_by: new.triggered_by,
            status: RunStatus::Running.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            resume_state: None,
            resume_at: None,
        };
        self.lock().runs.push(row.clone());
        Ok(row)
    }

    async fn get_run(&self, id: Uuid) -> Result<ExecutionRunRow, DbError> {
        self.lock()
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn list_runs(&self, automation_id: Uuid, page: Page) -> Result<Vec<ExecutionRunRow>, DbError> {
        Ok(self
            .lock()
            .runs
            .iter()
            .rev()
            .filter(|r| r.automation_id == automation_id)
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect())
    }

    async fn suspend_run(
        &self,
        id: Uuid,
        resume_state: serde_json::Value,
        resume_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut inner = self.lock();
        let run = inner.run_mut(id)?;
        if !run.is(RunStatus::Running) {
            return Err(DbError::Conflict(format!("run {id} is {}, not running", run.status)));
        }
        run.status = RunStatus::Suspended.to_string();
        run.resume_state = Some(resume_state);
        run.resume_at = Some(resume_at);
        Ok(())
    }

    async fn finish_run(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<ExecutionRunRow, DbError> {
        let mut inner = self.lock();
        let run = inner.run_mut(id)?;
        if !run.is(RunStatus::Running) {
            return Err(DbError::Conflict(format!("run {id} is {}, not running", run.status)));
        }
        run.status = status.to_string();
        run.error_message = error_message;
        run.completed_at = Some(Utc::now());
        run.resume_state = None;
        run.resume_at = None;
        Ok(run.clone())
    }

    async fn claim_suspended_run(&self, id: Uuid) -> Result<bool, DbError> {
        let mut inner = self.lock();
        let run = inner.run_mut(id)?;
        if !run.is(RunStatus::Suspended) {
            return Ok(false);
        }
        run.status = RunStatus::Running.to_string();
        Ok(true)
    }

    async fn due_suspended_runs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ExecutionRunRow>, DbError> {
        let inner = self.lock();
        let mut due: Vec<ExecutionRunRow> = inner
            .runs
            .iter()
            .filter(|r| r.is(RunStatus::Suspended) && r.resume_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|r| r.resume_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn cancel_suspended_run(&self, id: Uuid) -> Result<bool, DbError> {
        let mut inner = self.lock();
        let run = inner.run_mut(id)?;
        if !run.is(RunStatus::Suspended) {
            return Ok(false);
        }
        run.status = RunStatus::Failed.to_string();
        run.error_message = Some("cancelled".into());
        run.completed_at = Some(Utc::now());
        run.resume_state = None;
        run.resume_at = None;
        Ok(true)
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn next_cursor(&self, automation_id: Uuid, node_id: &str) -> Result<u64, DbError> {
        let mut inner = self.lock();
        let slot = inner
            .cursors
            .entry((automation_id, node_id.to_owned()))
            .or_insert(0);
        let current = *slot;
        *slot += 1;
        Ok(current)
    }

    async fn peek_cursor(&self, automation_id: Uuid, node_id: &str) -> Result<u64, DbError> {
        Ok(self
            .lock()
            .cursors
            .get(&(automation_id, node_id.to_owned()))
            .copied()
            .unwrap_or(0))
    }
}
