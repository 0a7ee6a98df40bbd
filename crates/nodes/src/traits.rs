//! Collaborator contracts — the CRM subsystems actions write into.
//!
//! Each is an opaque effect that can fail. Implementations report deleted
//! targets as [`ActionError::MissingEntity`] and any other failure as
//! [`ActionError::WriteFailed`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::{RecordSnapshot, Temperature};
use crate::ActionError;

/// Shared context passed to every action during execution.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub tenant_id: Uuid,
    pub automation_id: Uuid,
    pub run_id: Uuid,
    /// The action node being executed.
    pub node_id: String,
    pub record_id: String,
    /// Nodes visited so far in this run, inherited across re-entrant events.
    /// Collaborators that raise domain events stamp it as the chain depth.
    pub hops: u32,
}

impl ActionContext {
    /// Actor id recorded on mutations made by automations.
    pub fn actor_id(&self) -> String {
        format!("automation:{}", self.automation_id)
    }
}

/// One change to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordMutation {
    SetStatus { status_id: String },
    SetTemperature { temperature: Temperature },
    AddTag { tag_id: String },
    RemoveTag { tag_id: String },
    AddMotivation { motivation_id: String },
    RemoveMotivation { motivation_id: String },
    MoveToBoard { board_id: String, column_id: Option<String> },
    Assign { user_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub record_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub assignee_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub record_id: String,
    pub message: String,
}

#[async_trait]
pub trait RecordGateway: Send + Sync {
    /// Current state of the record.
    async fn load_record(&self, tenant_id: Uuid, record_id: &str) -> Result<RecordSnapshot, ActionError>;

    async fn apply_mutation(
        &self,
        ctx: &ActionContext,
        mutation: RecordMutation,
    ) -> Result<(), ActionError>;
}

#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Create the task and return its id.
    async fn create_task(&self, ctx: &ActionContext, task: NewTask) -> Result<String, ActionError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, ctx: &ActionContext, notification: Notification) -> Result<(), ActionError>;
}
