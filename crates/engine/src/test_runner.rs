//! Manual test runs from the builder.
//!
//! Goes through the same walker entry point as a real trigger, but ignores
//! `isActive` so drafts can be tried out before they are switched on.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use db::models::ExecutionRunRow;
use db::AutomationStore;
use queue::DomainEvent;

use crate::models::Automation;
use crate::validate::validate_graph;
use crate::walker::{GraphWalker, MANUAL_TEST};
use crate::EngineError;

pub struct TestRunner {
    automations: Arc<dyn AutomationStore>,
    walker: Arc<GraphWalker>,
}

impl TestRunner {
    pub fn new(automations: Arc<dyn AutomationStore>, walker: Arc<GraphWalker>) -> Self {
        Self { automations, walker }
    }

    /// Run `automation_id` once against `record_id` and return the settled
    /// run (`completed`, `failed`, or `suspended` at a wait).
    #[instrument(skip(self))]
    pub async fn test(
        &self,
        automation_id: Uuid,
        record_id: &str,
    ) -> Result<ExecutionRunRow, EngineError> {
        let row = self
            .automations
            .get_automation(automation_id)
            .await
            .map_err(EngineError::not_found("automation", automation_id))?;
        let automation = Automation::try_from(row)?;
        validate_graph(&automation.workflow_graph)?;

        let event_type = automation
            .workflow_graph
            .trigger()
            .map(|(_, spec)| spec.event_type())
            .ok_or(EngineError::MissingTrigger)?;
        let event = DomainEvent::new(automation.tenant_id, event_type, record_id, json!({}), MANUAL_TEST);

        let run = self.walker.open_run(automation.id, record_id, MANUAL_TEST).await?;
        let run = self.walker.execute(&automation, &run, &event).await?;
        info!(run_id = %run.id, status = %run.status, "test run finished");
        Ok(run)
    }
}
