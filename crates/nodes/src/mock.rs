//! `InMemoryCrm` — an in-process stand-in for the CRM services.
//!
//! Implements [`RecordGateway`], [`TaskGateway`] and [`Notifier`] over plain
//! maps and records every effect for assertions.
//!
//! When wired to an [`EventBus`] it raises the same domain events the real
//! record subsystem would, stamped with the run's hop count.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use queue::{event_types, DomainEvent, EventBus};

use crate::record::RecordSnapshot;
use crate::traits::{
    ActionContext, NewTask, Notification, Notifier, RecordGateway, RecordMutation, TaskGateway,
};
use crate::ActionError;

#[derive(Default)]
struct CrmState {
    records: HashMap<String, RecordSnapshot>,
    statuses: HashSet<String>,
    tags: HashSet<String>,
    motivations: HashSet<String>,
    users: HashSet<String>,
    boards: HashSet<String>,
    tasks: Vec<NewTask>,
    notifications: Vec<Notification>,
    mutations: Vec<(String, RecordMutation)>,
    fail_writes: bool,
}

impl CrmState {
    fn require(set: &HashSet<String>, entity: &'static str, id: &str) -> Result<(), ActionError> {
        if set.contains(id) {
            Ok(())
        } else {
            Err(ActionError::missing(entity, id))
        }
    }
}

#[derive(Default)]
pub struct InMemoryCrm {
    state: Mutex<CrmState>,
    events: Option<EventBus>,
}

impl InMemoryCrm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise domain events for every applied record mutation.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    fn lock(&self) -> MutexGuard<'_, CrmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- fixtures ----------------------------------------------------------

    pub fn add_record(&self, record: RecordSnapshot) {
        self.lock().records.insert(record.id.clone(), record);
    }

    pub fn add_status(&self, id: &str) {
        self.lock().statuses.insert(id.to_owned());
    }

    pub fn remove_status(&self, id: &str) {
        self.lock().statuses.remove(id);
    }

    pub fn add_tag(&self, id: &str) {
        self.lock().tags.insert(id.to_owned());
    }

    pub fn add_motivation(&self, id: &str) {
        self.lock().motivations.insert(id.to_owned());
    }

    pub fn add_user(&self, id: &str) {
        self.lock().users.insert(id.to_owned());
    }

    pub fn remove_user(&self, id: &str) {
        self.lock().users.remove(id);
    }

    pub fn add_board(&self, id: &str) {
        self.lock().boards.insert(id.to_owned());
    }

    /// Make every subsequent write fail with [`ActionError::WriteFailed`].
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    // -- inspection --------------------------------------------------------

    pub fn record(&self, id: &str) -> Option<RecordSnapshot> {
        self.lock().records.get(id).cloned()
    }

    pub fn tasks(&self) -> Vec<NewTask> {
        self.lock().tasks.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn mutations(&self) -> Vec<(String, RecordMutation)> {
        self.lock().mutations.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().mutations.len()
    }

    fn raise(&self, ctx: &ActionContext, event_type: &str, payload: serde_json::Value) {
        if let Some(bus) = &self.events {
            let event = DomainEvent::new(ctx.tenant_id, event_type, &ctx.record_id, payload, ctx.actor_id())
                .with_chain_depth(ctx.hops);
            bus.emit(event);
        }
    }
}

#[async_trait]
impl RecordGateway for InMemoryCrm {
    async fn load_record(&self, _tenant_id: Uuid, record_id: &str) -> Result<RecordSnapshot, ActionError> {
        self.record(record_id)
            .ok_or_else(|| ActionError::missing("record", record_id))
    }

    async fn apply_mutation(
        &self,
        ctx: &ActionContext,
        mutation: RecordMutation,
    ) -> Result<(), ActionError> {
        let event = {
            let mut state = self.lock();
            if state.fail_writes {
                return Err(ActionError::WriteFailed("record store unavailable".into()));
            }
            match &mutation {
                RecordMutation::SetStatus { status_id } => {
                    CrmState::require(&state.statuses, "status", status_id)?
                }
                RecordMutation::AddTag { tag_id } | RecordMutation::RemoveTag { tag_id } => {
                    CrmState::require(&state.tags, "tag", tag_id)?
                }
                RecordMutation::AddMotivation { motivation_id }
                | RecordMutation::RemoveMotivation { motivation_id } => {
                    CrmState::require(&state.motivations, "motivation", motivation_id)?
                }
                RecordMutation::MoveToBoard { board_id, .. } => {
                    CrmState::require(&state.boards, "board", board_id)?
                }
                RecordMutation::Assign { user_id } => CrmState::require(&state.users, "user", user_id)?,
                RecordMutation::SetTemperature { .. } => {}
            }

            let record = state
                .records
                .get_mut(&ctx.record_id)
                .ok_or_else(|| ActionError::missing("record", &ctx.record_id))?;

            let event = match &mutation {
                RecordMutation::SetStatus { status_id } => {
                    let from = record.status_id.replace(status_id.clone());
                    Some((event_types::STATUS_CHANGED, json!({ "fromStatusId": from, "toStatusId": status_id })))
                }
                RecordMutation::SetTemperature { temperature } => {
                    record.temperature = Some(*temperature);
                    Some((event_types::TEMPERATURE_CHANGED, json!({ "temperature": temperature })))
                }
                RecordMutation::AddTag { tag_id } => {
                    if !record.has_tag(tag_id) {
                        record.tag_ids.push(tag_id.clone());
                    }
                    Some((event_types::TAG_ADDED, json!({ "tagId": tag_id })))
                }
                RecordMutation::RemoveTag { tag_id } => {
                    record.tag_ids.retain(|t| t != tag_id);
                    Some((event_types::TAG_REMOVED, json!({ "tagId": tag_id })))
                }
                RecordMutation::AddMotivation { motivation_id } => {
                    if !record.has_motivation(motivation_id) {
                        record.motivation_ids.push(motivation_id.clone());
                    }
                    None
                }
                RecordMutation::RemoveMotivation { motivation_id } => {
                    record.motivation_ids.retain(|m| m != motivation_id);
                    None
                }
                RecordMutation::MoveToBoard { board_id, column_id } => {
                    record.board_id = Some(board_id.clone());
                    record.column_id = column_id.clone();
                    Some((event_types::BOARD_MOVED, json!({ "boardId": board_id, "columnId": column_id })))
                }
                RecordMutation::Assign { user_id } => {
                    record.assigned_user_id = Some(user_id.clone());
                    Some((event_types::RECORD_ASSIGNED, json!({ "userId": user_id })))
                }
            };

            state.mutations.push((ctx.record_id.clone(), mutation));
            event
        };

        if let Some((event_type, payload)) = event {
            self.raise(ctx, event_type, payload);
        }
        Ok(())
    }
}

#[async_trait]
impl TaskGateway for InMemoryCrm {
    async fn create_task(&self, _ctx: &ActionContext, task: NewTask) -> Result<String, ActionError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(ActionError::WriteFailed("task store unavailable".into()));
        }
        if !state.records.contains_key(&task.record_id) {
            return Err(ActionError::missing("record", &task.record_id));
        }
        if let Some(user) = &task.assignee_id {
            CrmState::require(&state.users, "user", user)?;
        }
        state.tasks.push(task);
        Ok(format!("task-{}", state.tasks.len()))
    }
}

#[async_trait]
impl Notifier for InMemoryCrm {
    async fn notify(&self, _ctx: &ActionContext, notification: Notification) -> Result<(), ActionError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(ActionError::WriteFailed("notification service unavailable".into()));
        }
        CrmState::require(&state.users, "user", &notification.user_id)?;
        state.notifications.push(notification);
        Ok(())
    }
}
