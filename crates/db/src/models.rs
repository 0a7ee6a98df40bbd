//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour. The
//! workflow graph is stored as opaque JSON; its typed form lives in the
//! `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// automations
// ---------------------------------------------------------------------------

/// A persisted automation row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_draft: bool,
    /// Full JSON workflow graph (nodes and edges).
    pub workflow_graph: serde_json::Value,
    pub run_count: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when an automation is first saved.
#[derive(Debug, Clone)]
pub struct NewAutomation {
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub workflow_graph: serde_json::Value,
    pub is_active: bool,
    pub is_draft: bool,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct AutomationPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub workflow_graph: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub is_draft: Option<bool>,
}

impl AutomationPatch {
    pub(crate) fn apply(self, row: &mut AutomationRow, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            row.name = name;
        }
        if let Some(description) = self.description {
            row.description = Some(description);
        }
        if let Some(graph) = self.workflow_graph {
            row.workflow_graph = graph;
        }
        if let Some(active) = self.is_active {
            row.is_active = active;
        }
        if let Some(draft) = self.is_draft {
            row.is_draft = draft;
        }
        row.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// execution_runs
// ---------------------------------------------------------------------------

/// Lifecycle of one automation run.
///
/// `Completed` and `Failed` are terminal; rows in those states are never
/// written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Suspended,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            other       => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A persisted execution run (the audit log entry for one run).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRunRow {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub record_id: String,
    /// Trigger subtype, or `manual_test`.
    pub triggered_by: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Continuation point while suspended; opaque to this crate.
    pub resume_state: Option<serde_json::Value>,
    pub resume_at: Option<DateTime<Utc>>,
}

impl ExecutionRunRow {
    pub fn run_status(&self) -> Result<RunStatus, DbError> {
        self.status.parse().map_err(DbError::Corrupt)
    }

    pub fn is(&self, status: RunStatus) -> bool {
        self.status == status.as_str()
    }
}

/// Fields supplied when a run is opened. Runs always start `running`.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub automation_id: Uuid,
    pub record_id: String,
    pub triggered_by: String,
}

/// 1-based pagination window for log listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 25)
    }
}
