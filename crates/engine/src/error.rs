//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use nodes::ActionError;

/// Errors produced by the automation engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors (save / activate time) ------

    /// The stored or submitted graph is not valid JSON for the graph model.
    #[error("invalid workflow graph: {0}")]
    InvalidGraphJson(String),

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    #[error("workflow graph has no trigger node")]
    MissingTrigger,

    #[error("workflow graph has {0} trigger nodes; exactly one is allowed")]
    MultipleTriggers(usize),

    #[error("node '{0}' is not reachable from the trigger")]
    UnreachableNode(String),

    #[error("node '{node_id}' has {count} outgoing edges; at most one is allowed")]
    TooManyOutgoingEdges { node_id: String, count: usize },

    #[error("condition '{node_id}' has an edge for unknown branch '{branch_id}'")]
    DanglingBranchEdge { node_id: String, branch_id: String },

    #[error("condition '{node_id}' needs exactly one edge for branch '{branch_id}', found {count}")]
    BranchEdgeCount {
        node_id: String,
        branch_id: String,
        count: usize,
    },

    #[error("condition '{node_id}' declares branch '{branch_id}' more than once")]
    DuplicateBranchId { node_id: String, branch_id: String },

    #[error("branch '{branch_id}' of condition '{node_id}' must lead to a branch node")]
    BranchTargetNotBranch { node_id: String, branch_id: String },

    #[error("branch '{branch_id}' of condition '{node_id}' has no conditions")]
    EmptyBranch { node_id: String, branch_id: String },

    #[error("operator '{operator}' is not supported for field '{field}'")]
    UnsupportedOperator { field: String, operator: String },

    #[error("operator '{operator}' on field '{field}' requires a value")]
    MissingConditionValue { field: String, operator: String },

    #[error("invalid value {value} for field '{field}'")]
    InvalidConditionValue { field: String, value: String },

    #[error("action '{node_id}' is misconfigured: {message}")]
    InvalidAction { node_id: String, message: String },

    // ------ Execution errors (fail only the current run) ------

    /// An action's downstream entity is gone or its write failed.
    #[error("action '{node_id}' failed: {source}")]
    RuntimeAction {
        node_id: String,
        #[source]
        source: ActionError,
    },

    /// The run (including re-entrant event chains) visited too many nodes.
    #[error("loop guard: run exceeded {max_hops} hops")]
    LoopGuard { max_hops: u32 },

    /// The graph broke an invariant that only showed up while walking it.
    #[error("malformed graph at run time: {0}")]
    MalformedGraph(String),

    /// A suspended run's stored continuation could not be read or written.
    #[error("invalid resume state: {0}")]
    ResumeState(String),

    /// An automation's run task died before recording an outcome.
    #[error("automation run aborted: {0}")]
    DispatchIsolation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

impl EngineError {
    /// True for errors raised while saving or activating a graph.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidGraphJson(_)
                | Self::DuplicateNodeId(_)
                | Self::UnknownNodeReference { .. }
                | Self::CycleDetected
                | Self::MissingTrigger
                | Self::MultipleTriggers(_)
                | Self::UnreachableNode(_)
                | Self::TooManyOutgoingEdges { .. }
                | Self::DanglingBranchEdge { .. }
                | Self::BranchEdgeCount { .. }
                | Self::DuplicateBranchId { .. }
                | Self::BranchTargetNotBranch { .. }
                | Self::EmptyBranch { .. }
                | Self::UnsupportedOperator { .. }
                | Self::MissingConditionValue { .. }
                | Self::InvalidConditionValue { .. }
                | Self::InvalidAction { .. }
        )
    }

    /// Map a store miss onto the entity that was looked up.
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> impl FnOnce(db::DbError) -> Self {
        move |e| match e {
            db::DbError::NotFound => Self::NotFound { entity, id },
            other => Self::Database(other),
        }
    }
}
