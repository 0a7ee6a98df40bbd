//! Typed configuration for every action subtype.
//!
//! On the wire an action node carries `{"subtype": "...", "config": {...}}`;
//! the subtype picks the variant.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Temperature;

/// Upper bound for waits and task due offsets.
pub const MAX_OFFSET_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "subtype",
    content = "config",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ActionConfig {
    UpdateStatus { status_id: String },
    UpdateTemperature { temperature: Temperature },
    AddTag { tag_id: String },
    RemoveTag { tag_id: String },
    AddMotivation { motivation_id: String },
    RemoveMotivation { motivation_id: String },
    MoveToBoard {
        board_id: String,
        #[serde(default)]
        column_id: Option<String>,
    },
    AssignUser { user_id: String },
    CreateTask(TaskTemplate),
    SendNotification {
        /// Recipient; the record's assigned user when unset.
        #[serde(default)]
        user_id: Option<String>,
        message: String,
    },
    Wait(WaitDuration),
}

impl ActionConfig {
    /// Wire name of the subtype.
    pub fn subtype(&self) -> &'static str {
        match self {
            Self::UpdateStatus { .. } => "update_status",
            Self::UpdateTemperature { .. } => "update_temperature",
            Self::AddTag { .. } => "add_tag",
            Self::RemoveTag { .. } => "remove_tag",
            Self::AddMotivation { .. } => "add_motivation",
            Self::RemoveMotivation { .. } => "remove_motivation",
            Self::MoveToBoard { .. } => "move_to_board",
            Self::AssignUser { .. } => "assign_user",
            Self::CreateTask(_) => "create_task",
            Self::SendNotification { .. } => "send_notification",
            Self::Wait(_) => "wait",
        }
    }

    /// Save-time checks on the config values themselves. Whether the
    /// referenced entities still exist is only known at run time.
    pub fn validate(&self) -> Result<(), String> {
        let required = |value: &str, what: &str| {
            if value.trim().is_empty() {
                Err(format!("{} requires a {what}", self.subtype()))
            } else {
                Ok(())
            }
        };

        match self {
            Self::UpdateStatus { status_id } => required(status_id, "status"),
            Self::UpdateTemperature { .. } => Ok(()),
            Self::AddTag { tag_id } | Self::RemoveTag { tag_id } => required(tag_id, "tag"),
            Self::AddMotivation { motivation_id } | Self::RemoveMotivation { motivation_id } => {
                required(motivation_id, "motivation")
            }
            Self::MoveToBoard { board_id, .. } => required(board_id, "board"),
            Self::AssignUser { user_id } => required(user_id, "user"),
            Self::CreateTask(task) => {
                required(&task.title, "title")?;
                task.validate()
            }
            Self::SendNotification { message, .. } => required(message, "message"),
            Self::Wait(wait) => {
                if wait.amount == 0 {
                    Err("wait duration must be positive".into())
                } else if wait.to_duration() > Duration::days(MAX_OFFSET_DAYS) {
                    Err(format!("wait duration must not exceed {MAX_OFFSET_DAYS} days"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// create_task
// ---------------------------------------------------------------------------

/// Who a created task is assigned to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TaskAssignee {
    /// Whoever the record is assigned to (unassigned task if nobody).
    #[default]
    RecordOwner,
    User { user_id: String },
    /// Rotate fairly through the list, one user per run.
    RoundRobin { round_robin_users: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    /// Days from the moment the action runs; no due date when unset.
    #[serde(default)]
    pub due_in_days: Option<u32>,
    /// `HH:MM` (UTC) on the due day; start of the working day when unset.
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub assignee: TaskAssignee,
}

impl TaskTemplate {
    const DEFAULT_DUE_TIME: (u32, u32) = (9, 0);

    fn validate(&self) -> Result<(), String> {
        if self.due_in_days.is_some_and(|days| i64::from(days) > MAX_OFFSET_DAYS) {
            return Err(format!("task due offset must not exceed {MAX_OFFSET_DAYS} days"));
        }
        if let Some(time) = &self.due_time {
            parse_due_time(time)?;
        }
        match &self.assignee {
            TaskAssignee::RoundRobin { round_robin_users } if round_robin_users.is_empty() => {
                Err("round-robin assignment requires at least one user".into())
            }
            TaskAssignee::User { user_id } if user_id.trim().is_empty() => {
                Err("task assignment requires a user".into())
            }
            _ => Ok(()),
        }
    }

    /// Resolve the scheduling fields against `now`.
    pub fn due_at(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, String> {
        let Some(days) = self.due_in_days else {
            return Ok(None);
        };
        let time = match &self.due_time {
            Some(raw) => parse_due_time(raw)?,
            None => {
                let (h, m) = Self::DEFAULT_DUE_TIME;
                NaiveTime::from_hms_opt(h, m, 0).ok_or("invalid default due time")?
            }
        };
        let day = now
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| format!("due offset of {days} days is out of range"))?
            .date_naive();
        Ok(Some(day.and_time(time).and_utc()))
    }
}

fn parse_due_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| format!("invalid due time '{raw}': {e}"))
}

// ---------------------------------------------------------------------------
// wait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUnit {
    Minutes,
    Hours,
    Days,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitDuration {
    pub amount: u32,
    pub unit: WaitUnit,
}

impl WaitDuration {
    pub fn to_duration(self) -> Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            WaitUnit::Minutes => Duration::minutes(amount),
            WaitUnit::Hours => Duration::hours(amount),
            WaitUnit::Days => Duration::days(amount),
        }
    }
}
