//! `ActionExecutor` — applies one action node against the collaborators.
//!
//! One mutation per subtype. `wait` has no side effect here: it is reported
//! back as [`ActionOutcome::Suspend`] and the graph walker persists the
//! continuation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, instrument};

use db::CursorStore;

use crate::action::{ActionConfig, TaskAssignee, TaskTemplate};
use crate::record::RecordSnapshot;
use crate::traits::{
    ActionContext, NewTask, Notification, Notifier, RecordGateway, RecordMutation, TaskGateway,
};
use crate::ActionError;

/// What the walker should do after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Effect committed; continue with the next node.
    Applied,
    /// Pause the run for the given duration.
    Suspend { after: Duration },
}

#[derive(Clone)]
pub struct ActionExecutor {
    records: Arc<dyn RecordGateway>,
    tasks: Arc<dyn TaskGateway>,
    notifier: Arc<dyn Notifier>,
    cursors: Arc<dyn CursorStore>,
}

impl ActionExecutor {
    pub fn new(
        records: Arc<dyn RecordGateway>,
        tasks: Arc<dyn TaskGateway>,
        notifier: Arc<dyn Notifier>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        Self { records, tasks, notifier, cursors }
    }

    /// Apply `action` for the record in `ctx`. `record` is the snapshot the
    /// run currently holds; it supplies the owner for owner-relative actions.
    #[instrument(skip(self, action, record), fields(node_id = %ctx.node_id, subtype = action.subtype()))]
    pub async fn execute(
        &self,
        action: &ActionConfig,
        ctx: &ActionContext,
        record: &RecordSnapshot,
    ) -> Result<ActionOutcome, ActionError> {
        let mutation = match action {
            ActionConfig::UpdateStatus { status_id } => {
                RecordMutation::SetStatus { status_id: status_id.clone() }
            }
            ActionConfig::UpdateTemperature { temperature } => {
                RecordMutation::SetTemperature { temperature: *temperature }
            }
            ActionConfig::AddTag { tag_id } => RecordMutation::AddTag { tag_id: tag_id.clone() },
            ActionConfig::RemoveTag { tag_id } => RecordMutation::RemoveTag { tag_id: tag_id.clone() },
            ActionConfig::AddMotivation { motivation_id } => {
                RecordMutation::AddMotivation { motivation_id: motivation_id.clone() }
            }
            ActionConfig::RemoveMotivation { motivation_id } => {
                RecordMutation::RemoveMotivation { motivation_id: motivation_id.clone() }
            }
            ActionConfig::MoveToBoard { board_id, column_id } => RecordMutation::MoveToBoard {
                board_id: board_id.clone(),
                column_id: column_id.clone(),
            },
            ActionConfig::AssignUser { user_id } => RecordMutation::Assign { user_id: user_id.clone() },

            ActionConfig::CreateTask(template) => {
                let task = self.build_task(template, ctx, record).await?;
                let task_id = self.tasks.create_task(ctx, task).await?;
                debug!(%task_id, "task created");
                return Ok(ActionOutcome::Applied);
            }

            ActionConfig::SendNotification { user_id, message } => {
                let user_id = user_id
                    .clone()
                    .or_else(|| record.assigned_user_id.clone())
                    .ok_or_else(|| ActionError::missing("assigned user for record", &record.id))?;
                self.notifier
                    .notify(
                        ctx,
                        Notification {
                            user_id,
                            record_id: ctx.record_id.clone(),
                            message: message.clone(),
                        },
                    )
                    .await?;
                return Ok(ActionOutcome::Applied);
            }

            ActionConfig::Wait(wait) => {
                return Ok(ActionOutcome::Suspend { after: wait.to_duration() });
            }
        };

        self.records.apply_mutation(ctx, mutation).await?;
        Ok(ActionOutcome::Applied)
    }

    async fn build_task(
        &self,
        template: &TaskTemplate,
        ctx: &ActionContext,
        record: &RecordSnapshot,
    ) -> Result<NewTask, ActionError> {
        let assignee_id = match &template.assignee {
            TaskAssignee::RecordOwner => record.assigned_user_id.clone(),
            TaskAssignee::User { user_id } => Some(user_id.clone()),
            TaskAssignee::RoundRobin { round_robin_users } => {
                Some(self.next_round_robin_user(ctx, round_robin_users).await?)
            }
        };

        Ok(NewTask {
            record_id: ctx.record_id.clone(),
            title: template.title.clone(),
            description: template.description.clone(),
            priority: template.priority.clone(),
            due_at: template.due_at(Utc::now()).map_err(ActionError::InvalidConfig)?,
            assignee_id,
        })
    }

    /// `users[cursor mod len]`, with the cursor read-and-incremented in one
    /// atomic store operation.
    async fn next_round_robin_user(
        &self,
        ctx: &ActionContext,
        users: &[String],
    ) -> Result<String, ActionError> {
        if users.is_empty() {
            return Err(ActionError::InvalidConfig(
                "round-robin assignment has no users".into(),
            ));
        }
        let slot = self.cursors.next_cursor(ctx.automation_id, &ctx.node_id).await?;
        let index = (slot % users.len() as u64) as usize;
        debug!(slot, user = %users[index], "round-robin slot taken");
        Ok(users[index].clone())
    }
}
