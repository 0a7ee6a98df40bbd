//! Automation persistence with graph validation.
//!
//! Every write that stores a graph, and every activation, validates the
//! graph first; a rejected save leaves the stored automation untouched.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use db::models::{AutomationPatch, ExecutionRunRow, NewAutomation, Page};
use db::{AutomationStore, RunStore};

use crate::models::{Automation, WorkflowGraph};
use crate::validate::validate_graph;
use crate::EngineError;

/// Payload of a builder "create".
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomation {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workflow_graph: serde_json::Value,
    #[serde(default)]
    pub is_active: bool,
}

/// Payload of a builder "save"; absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutomation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workflow_graph: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub struct AutomationService {
    automations: Arc<dyn AutomationStore>,
    runs: Arc<dyn RunStore>,
}

impl AutomationService {
    pub fn new(automations: Arc<dyn AutomationStore>, runs: Arc<dyn RunStore>) -> Self {
        Self { automations, runs }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        tenant_id: Uuid,
        input: CreateAutomation,
    ) -> Result<Automation, EngineError> {
        let graph = parse_and_validate(input.workflow_graph)?;

        let row = self
            .automations
            .create_automation(NewAutomation {
                tenant_id,
                name: input.name,
                description: input.description,
                workflow_graph: graph.to_json(),
                is_active: input.is_active,
                is_draft: !input.is_active,
            })
            .await?;

        info!(automation_id = %row.id, is_active = row.is_active, "automation created");
        Automation::try_from(row)
    }

    pub async fn get(&self, id: Uuid) -> Result<Automation, EngineError> {
        let row = self
            .automations
            .get_automation(id)
            .await
            .map_err(EngineError::not_found("automation", id))?;
        Automation::try_from(row)
    }

    /// All of a tenant's automations, newest first. Rows whose graph no
    /// longer parses are reported as errors rather than skipped.
    pub async fn list(&self, tenant_id: Uuid) -> Result<Vec<Automation>, EngineError> {
        self.automations
            .list_automations(tenant_id)
            .await?
            .into_iter()
            .map(Automation::try_from)
            .collect()
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: Uuid, input: UpdateAutomation) -> Result<Automation, EngineError> {
        let graph = match input.workflow_graph {
            Some(raw) => Some(parse_and_validate(raw)?),
            None => None,
        };

        let activating = input.is_active == Some(true);
        if activating && graph.is_none() {
            // Activation re-checks the stored graph.
            validate_graph(&self.get(id).await?.workflow_graph)?;
        }

        let patch = AutomationPatch {
            name: input.name,
            description: input.description,
            workflow_graph: graph.map(|g| g.to_json()),
            is_active: input.is_active,
            is_draft: activating.then_some(false),
        };
        let row = self
            .automations
            .update_automation(id, patch)
            .await
            .map_err(EngineError::not_found("automation", id))?;

        info!(is_active = row.is_active, "automation saved");
        Automation::try_from(row)
    }

    /// Delete an automation along with its run log and cursors.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        self.automations
            .delete_automation(id)
            .await
            .map_err(EngineError::not_found("automation", id))?;
        info!("automation deleted");
        Ok(())
    }

    /// One page of an automation's run log, newest first.
    pub async fn runs(&self, automation_id: Uuid, page: Page) -> Result<Vec<ExecutionRunRow>, EngineError> {
        self.automations
            .get_automation(automation_id)
            .await
            .map_err(EngineError::not_found("automation", automation_id))?;
        Ok(self.runs.list_runs(automation_id, page).await?)
    }

    pub async fn run(&self, run_id: Uuid) -> Result<ExecutionRunRow, EngineError> {
        self.runs
            .get_run(run_id)
            .await
            .map_err(EngineError::not_found("run", run_id))
    }

    /// Cancel a pending resume. `false` when the run wasn't suspended.
    #[instrument(skip(self))]
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<bool, EngineError> {
        self.run(run_id).await?;
        let cancelled = self.runs.cancel_suspended_run(run_id).await?;
        info!(cancelled, "run cancel requested");
        Ok(cancelled)
    }
}

fn parse_and_validate(raw: serde_json::Value) -> Result<WorkflowGraph, EngineError> {
    let graph = WorkflowGraph::from_json(raw)?;
    validate_graph(&graph)?;
    Ok(graph)
}
