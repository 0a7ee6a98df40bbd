//! Core domain models for the automation engine.
//!
//! These types are the source of truth for what an automation's workflow
//! graph looks like in memory. They are serialised to/from the JSONB
//! `workflow_graph` column of the `automations` table, in the shape the
//! graph builder saves. Builder-only fields (node position, viewport) are
//! ignored on the way in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::models::AutomationRow;
use nodes::{ActionConfig, Temperature};
use queue::{event_types, DomainEvent};

use crate::EngineError;

/// Identifier of the implicit fallback branch every condition node has.
pub const NONE_BRANCH: &str = "none";

/// `isAssigned` value meaning "assigned to any user".
pub const ASSIGNED_TO_ANYONE: &str = "anyone";

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The event a trigger node listens for, with optional payload filters.
///
/// Filters left unset match any value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "subtype",
    content = "config",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum TriggerSpec {
    RecordCreated {},
    StatusChanged {
        from_status_id: Option<String>,
        to_status_id: Option<String>,
    },
    TemperatureChanged { temperature: Option<Temperature> },
    TagAdded { tag_id: Option<String> },
    TagRemoved { tag_id: Option<String> },
    RecordAssigned { user_id: Option<String> },
    TaskCompleted {},
    BoardMoved {
        board_id: Option<String>,
        column_id: Option<String>,
    },
}

impl TriggerSpec {
    /// The domain event type this trigger listens for.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RecordCreated {} => event_types::RECORD_CREATED,
            Self::StatusChanged { .. } => event_types::STATUS_CHANGED,
            Self::TemperatureChanged { .. } => event_types::TEMPERATURE_CHANGED,
            Self::TagAdded { .. } => event_types::TAG_ADDED,
            Self::TagRemoved { .. } => event_types::TAG_REMOVED,
            Self::RecordAssigned { .. } => event_types::RECORD_ASSIGNED,
            Self::TaskCompleted {} => event_types::TASK_COMPLETED,
            Self::BoardMoved { .. } => event_types::BOARD_MOVED,
        }
    }

    /// Same event type, and every configured filter equals the payload field.
    pub fn matches(&self, event: &DomainEvent) -> bool {
        if event.event_type != self.event_type() {
            return false;
        }

        let filter = |expected: &Option<String>, key: &str| match expected {
            None => true,
            Some(value) => event.payload_str(key) == Some(value.as_str()),
        };

        match self {
            Self::RecordCreated {} | Self::TaskCompleted {} => true,
            Self::StatusChanged { from_status_id, to_status_id } => {
                filter(from_status_id, "fromStatusId") && filter(to_status_id, "toStatusId")
            }
            Self::TemperatureChanged { temperature } => {
                filter(&temperature.map(|t| t.to_string()), "temperature")
            }
            Self::TagAdded { tag_id } | Self::TagRemoved { tag_id } => filter(tag_id, "tagId"),
            Self::RecordAssigned { user_id } => filter(user_id, "userId"),
            Self::BoardMoved { board_id, column_id } => {
                filter(board_id, "boardId") && filter(column_id, "columnId")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Record attribute a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionField {
    Status,
    HasTag,
    HasMotivation,
    Temperature,
    IsComplete,
    IsAssigned,
}

impl ConditionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::HasTag => "hasTag",
            Self::HasMotivation => "hasMotivation",
            Self::Temperature => "temperature",
            Self::IsComplete => "isComplete",
            Self::IsAssigned => "isAssigned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }

    /// `is_empty` / `is_not_empty` ignore the configured value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

/// How a condition joins the result accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Ignored on the first condition of a branch.
    #[serde(default)]
    pub combinator: Combinator,
}

/// A named, ordered list of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionBranch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", content = "config", rename_all = "snake_case")]
pub enum ConditionSpec {
    IfElse { branches: Vec<ConditionBranch> },
}

impl ConditionSpec {
    /// Declared branches in evaluation order (the None branch is implicit).
    pub fn branches(&self) -> &[ConditionBranch] {
        match self {
            Self::IfElse { branches } => branches,
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// What a node does; the closed set of node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerSpec),
    Condition(ConditionSpec),
    /// Landing point of one condition branch; passes straight through.
    Branch,
    Action(ActionConfig),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::Condition(_) => "condition",
            Self::Branch => "branch",
            Self::Action(_) => "action",
        }
    }
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within this graph (referenced by edges).
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Directed edge from one node to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
    /// Branch id for edges leaving a condition node.
    #[serde(default, alias = "sourceHandle", skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into(), branch_id: None }
    }

    pub fn branch(from: impl Into<String>, branch_id: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into(), branch_id: Some(branch_id.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn from_json(value: serde_json::Value) -> Result<Self, EngineError> {
        serde_json::from_value(value).map_err(|e| EngineError::InvalidGraphJson(e.to_string()))
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Plain data with string keys; serialisation can't fail.
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The first trigger node, with its spec.
    pub fn trigger(&self) -> Option<(&WorkflowNode, &TriggerSpec)> {
        self.nodes.iter().find_map(|n| match &n.kind {
            NodeKind::Trigger(spec) => Some((n, spec)),
            _ => None,
        })
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == node_id)
    }

    /// Target of the single outgoing edge of a trigger, branch or action node.
    pub fn successor(&self, node_id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.from == node_id)
            .map(|e| e.to.as_str())
    }

    /// Target of the edge leaving condition `node_id` for `branch_id`.
    pub fn branch_target(&self, node_id: &str, branch_id: &str) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.from == node_id && e.branch_id.as_deref() == Some(branch_id))
            .map(|e| e.to.as_str())
    }
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

/// A tenant's automation with its graph parsed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_draft: bool,
    pub workflow_graph: WorkflowGraph,
    pub run_count: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AutomationRow> for Automation {
    type Error = EngineError;

    fn try_from(row: AutomationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            is_draft: row.is_draft,
            workflow_graph: WorkflowGraph::from_json(row.workflow_graph)?,
            run_count: row.run_count,
            last_run_at: row.last_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
