//! Graph walking.
//!
//! `GraphWalker` is the single execution path for every run, whether it was
//! opened by a trigger, by the test runner, or is continuing after a wait:
//! 1. Visits one node at a time from the starting node, following the one
//!    edge each node selects. Branching never fans out.
//! 2. Re-reads the record before every condition and action node, so each
//!    step sees the effects of the previous one.
//! 3. On a `wait` action, persists the continuation and returns.
//! 4. Records the outcome on the run row (`completed` / `failed`). A failed
//!    action stops the run; earlier actions stay applied.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use db::models::{ExecutionRunRow, NewRun, RunStatus};
use db::{AutomationStore, DbError, RunStore};
use nodes::{ActionContext, ActionError, ActionExecutor, ActionOutcome, RecordGateway, RecordSnapshot};
use queue::DomainEvent;

use crate::condition::select_branch;
use crate::models::{Automation, NodeKind};
use crate::{EngineConfig, EngineError};

/// `triggered_by` of runs started by the test runner.
pub const MANUAL_TEST: &str = "manual_test";

// ---------------------------------------------------------------------------
// Resume state
// ---------------------------------------------------------------------------

/// Continuation stored on a suspended run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    /// Node the run continues from; the wait node's successor.
    pub next_node_id: String,
    pub tenant_id: Uuid,
    /// Hops already spent, carried so the loop guard spans the wait.
    pub hops: u32,
    /// Record as it was when the run suspended. Informational only: the
    /// walker re-reads the record before using it.
    pub record: RecordSnapshot,
}

/// How a walk ended when it didn't fail.
#[derive(Debug)]
enum Walk {
    Completed,
    Suspended {
        state: ResumeState,
        resume_at: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// GraphWalker
// ---------------------------------------------------------------------------

pub struct GraphWalker {
    automations: Arc<dyn AutomationStore>,
    runs: Arc<dyn RunStore>,
    records: Arc<dyn RecordGateway>,
    actions: ActionExecutor,
    config: EngineConfig,
}

impl GraphWalker {
    pub fn new(
        automations: Arc<dyn AutomationStore>,
        runs: Arc<dyn RunStore>,
        records: Arc<dyn RecordGateway>,
        actions: ActionExecutor,
        config: EngineConfig,
    ) -> Self {
        Self { automations, runs, records, actions, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the run row for `automation_id` and count it on the
    /// automation. If the count can't be stored the new run is failed
    /// before the error is returned.
    #[instrument(skip(self))]
    pub async fn open_run(
        &self,
        automation_id: Uuid,
        record_id: &str,
        triggered_by: &str,
    ) -> Result<ExecutionRunRow, EngineError> {
        let run = self
            .runs
            .create_run(NewRun {
                automation_id,
                record_id: record_id.to_owned(),
                triggered_by: triggered_by.to_owned(),
            })
            .await?;

        if let Err(e) = self
            .automations
            .record_automation_run(automation_id, run.started_at)
            .await
        {
            let err = EngineError::from(e);
            self.fail_run(run.id, &err).await?;
            return Err(err);
        }

        debug!(run_id = %run.id, "run opened");
        Ok(run)
    }

    /// Walk `automation`'s graph for an opened run, starting at the trigger.
    ///
    /// Any failure along the way is recorded on the run and the final row is
    /// returned; `Err` only means the outcome itself could not be stored.
    #[instrument(
        skip(self, automation, run, event),
        fields(automation_id = %automation.id, run_id = %run.id, event_type = %event.event_type)
    )]
    pub async fn execute(
        &self,
        automation: &Automation,
        run: &ExecutionRunRow,
        event: &DomainEvent,
    ) -> Result<ExecutionRunRow, EngineError> {
        let walk = match automation.workflow_graph.trigger() {
            Some((trigger, _)) => {
                let start = trigger.id.clone();
                self.walk(automation, run, start, event.chain_depth).await
            }
            None => Err(EngineError::MalformedGraph("graph has no trigger node".into())),
        };
        self.settle(run.id, walk).await
    }

    /// Continue a suspended run from its stored node.
    ///
    /// The run is claimed first; when the claim fails (another worker got it,
    /// or it was cancelled) this is a no-op returning `None`.
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: Uuid) -> Result<Option<ExecutionRunRow>, EngineError> {
        if !self.runs.claim_suspended_run(run_id).await? {
            info!("run is no longer suspended, skipping resume");
            return Ok(None);
        }

        let run = self
            .runs
            .get_run(run_id)
            .await
            .map_err(EngineError::not_found("run", run_id))?;

        let walk = match self.load_continuation(&run).await {
            Ok((automation, state)) => {
                info!(next_node_id = %state.next_node_id, "resuming run");
                self.walk(&automation, &run, state.next_node_id, state.hops).await
            }
            Err(e) => Err(e),
        };
        self.settle(run_id, walk).await.map(Some)
    }

    /// Mark a running run failed with `err`. `None` if it had already
    /// finished.
    pub async fn fail_run(
        &self,
        run_id: Uuid,
        err: &EngineError,
    ) -> Result<Option<ExecutionRunRow>, EngineError> {
        error!(%run_id, error = %err, "run failed");
        match self
            .runs
            .finish_run(run_id, RunStatus::Failed, Some(err.to_string()))
            .await
        {
            Ok(row) => Ok(Some(row)),
            Err(DbError::Conflict(_)) => {
                warn!(%run_id, "run already finished, failure not recorded");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn load_continuation(
        &self,
        run: &ExecutionRunRow,
    ) -> Result<(Automation, ResumeState), EngineError> {
        let raw = run
            .resume_state
            .clone()
            .ok_or_else(|| EngineError::ResumeState("suspended run has no resume state".into()))?;
        let state: ResumeState =
            serde_json::from_value(raw).map_err(|e| EngineError::ResumeState(e.to_string()))?;

        let row = self
            .automations
            .get_automation(run.automation_id)
            .await
            .map_err(EngineError::not_found("automation", run.automation_id))?;
        Ok((Automation::try_from(row)?, state))
    }

    async fn walk(
        &self,
        automation: &Automation,
        run: &ExecutionRunRow,
        start: String,
        mut hops: u32,
    ) -> Result<Walk, EngineError> {
        let graph = &automation.workflow_graph;
        let mut current = Some(start);

        while let Some(node_id) = current {
            hops += 1;
            if hops > self.config.max_hops {
                return Err(EngineError::LoopGuard { max_hops: self.config.max_hops });
            }

            let node = graph
                .node(&node_id)
                .ok_or_else(|| EngineError::MalformedGraph(format!("node '{node_id}' does not exist")))?;

            current = match &node.kind {
                NodeKind::Trigger(_) | NodeKind::Branch => graph.successor(&node.id).map(str::to_owned),

                NodeKind::Condition(spec) => {
                    let record = self.load_record(automation, run, &node.id).await?;
                    let branch = select_branch(spec.branches(), &record);
                    debug!(node_id = %node.id, branch, "branch selected");

                    let target = graph.branch_target(&node.id, branch).ok_or_else(|| {
                        EngineError::MalformedGraph(format!(
                            "condition '{}' has no edge for branch '{branch}'",
                            node.id
                        ))
                    })?;
                    Some(target.to_owned())
                }

                NodeKind::Action(action) => {
                    let record = self.load_record(automation, run, &node.id).await?;
                    let ctx = ActionContext {
                        tenant_id: automation.tenant_id,
                        automation_id: automation.id,
                        run_id: run.id,
                        node_id: node.id.clone(),
                        record_id: run.record_id.clone(),
                        hops,
                    };

                    let outcome = self
                        .actions
                        .execute(action, &ctx, &record)
                        .await
                        .map_err(|source| EngineError::RuntimeAction {
                            node_id: node.id.clone(),
                            source,
                        })?;

                    let next = graph.successor(&node.id).map(str::to_owned);
                    match (outcome, next) {
                        (ActionOutcome::Suspend { after }, Some(next_node_id)) => {
                            let resume_at = Utc::now().checked_add_signed(after).ok_or_else(|| {
                                EngineError::RuntimeAction {
                                    node_id: node.id.clone(),
                                    source: ActionError::InvalidConfig(format!(
                                        "wait of {after} is out of range"
                                    )),
                                }
                            })?;
                            return Ok(Walk::Suspended {
                                state: ResumeState {
                                    next_node_id,
                                    tenant_id: automation.tenant_id,
                                    hops,
                                    record,
                                },
                                resume_at,
                            });
                        }
                        // A trailing wait has nothing left to wait for.
                        (_, next) => next,
                    }
                }
            };
        }

        Ok(Walk::Completed)
    }

    async fn load_record(
        &self,
        automation: &Automation,
        run: &ExecutionRunRow,
        node_id: &str,
    ) -> Result<RecordSnapshot, EngineError> {
        self.records
            .load_record(automation.tenant_id, &run.record_id)
            .await
            .map_err(|source| EngineError::RuntimeAction {
                node_id: node_id.to_owned(),
                source,
            })
    }

    /// Persist how the walk ended.
    async fn settle(
        &self,
        run_id: Uuid,
        walk: Result<Walk, EngineError>,
    ) -> Result<ExecutionRunRow, EngineError> {
        let outcome = match walk {
            Ok(Walk::Completed) => {
                let row = self.runs.finish_run(run_id, RunStatus::Completed, None).await?;
                info!(%run_id, "run completed");
                return Ok(row);
            }
            Ok(Walk::Suspended { state, resume_at }) => self.suspend(run_id, &state, resume_at).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(row) => Ok(row),
            Err(e) => match self.fail_run(run_id, &e).await? {
                Some(row) => Ok(row),
                None => Ok(self.runs.get_run(run_id).await?),
            },
        }
    }

    async fn suspend(
        &self,
        run_id: Uuid,
        state: &ResumeState,
        resume_at: DateTime<Utc>,
    ) -> Result<ExecutionRunRow, EngineError> {
        let value =
            serde_json::to_value(state).map_err(|e| EngineError::ResumeState(e.to_string()))?;
        self.runs.suspend_run(run_id, value, resume_at).await?;
        info!(%run_id, %resume_at, next_node_id = %state.next_node_id, "run suspended");
        Ok(self.runs.get_run(run_id).await?)
    }
}
