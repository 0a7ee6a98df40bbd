//! Trigger dispatch.
//!
//! Every domain event is matched against the tenant's active automations.
//! Each match gets its own run and its own tokio task, so automations for the
//! same event run concurrently and one failing (or panicking) never touches
//! another.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use db::AutomationStore;
use queue::{DomainEvent, EventStream};

use crate::models::Automation;
use crate::walker::GraphWalker;
use crate::EngineError;

/// Automations an event applies to.
#[derive(Debug, Default)]
pub struct Candidates {
    pub matched: Vec<Automation>,
    /// Ids of automations whose stored graph failed to parse, with the error.
    pub unreadable: Vec<(Uuid, EngineError)>,
}

pub struct TriggerDispatcher {
    automations: Arc<dyn AutomationStore>,
    walker: Arc<GraphWalker>,
}

impl TriggerDispatcher {
    pub fn new(automations: Arc<dyn AutomationStore>, walker: Arc<GraphWalker>) -> Self {
        Self { automations, walker }
    }

    /// Active automations of the event's tenant whose trigger matches it,
    /// plus those whose stored graph no longer parses but may have been
    /// meant for this event (trigger subtype equal to the event type, or
    /// unreadable).
    pub async fn candidates(&self, event: &DomainEvent) -> Result<Candidates, EngineError> {
        let rows = self.automations.list_active_automations(event.tenant_id).await?;

        let mut candidates = Candidates::default();
        for row in rows {
            let id = row.id;
            let meant_for_event = raw_trigger_subtype(&row.workflow_graph)
                .map_or(true, |subtype| subtype == event.event_type);

            match Automation::try_from(row) {
                Ok(automation) => {
                    let hit = automation
                        .workflow_graph
                        .trigger()
                        .is_some_and(|(_, spec)| spec.matches(event));
                    if hit {
                        candidates.matched.push(automation);
                    }
                }
                Err(e) if meant_for_event => {
                    warn!(automation_id = %id, error = %e, "active automation has an unreadable graph");
                    candidates.unreadable.push((id, e));
                }
                Err(_) => {}
            }
        }
        Ok(candidates)
    }

    /// Start one run per matching automation and wait for all of them to
    /// settle (completed, failed or suspended). Returns the run ids.
    ///
    /// Automations with an unreadable graph get a run that is failed
    /// straight away, so the problem shows up in their run log.
    #[instrument(
        skip(self, event),
        fields(event_id = %event.id, event_type = %event.event_type, record_id = %event.record_id)
    )]
    pub async fn dispatch(&self, event: DomainEvent) -> Result<Vec<Uuid>, EngineError> {
        let Candidates { matched, unreadable } = self.candidates(&event).await?;
        if matched.is_empty() && unreadable.is_empty() {
            debug!("no automation matches event");
            return Ok(Vec::new());
        }
        info!(matched = matched.len(), unreadable = unreadable.len(), "dispatching event");

        let mut failed_ids = Vec::with_capacity(unreadable.len());
        for (automation_id, parse_err) in unreadable {
            match self.fail_unreadable(automation_id, &event, parse_err).await {
                Ok(run_id) => failed_ids.push(run_id),
                Err(e) => error!(%automation_id, error = %e, "could not record unreadable graph"),
            }
        }

        let event = Arc::new(event);
        let mut handles = Vec::with_capacity(matched.len());

        for automation in matched {
            let run = match self
                .walker
                .open_run(automation.id, &event.record_id, &event.event_type)
                .await
            {
                Ok(run) => run,
                Err(e) => {
                    error!(automation_id = %automation.id, error = %e, "could not open run");
                    continue;
                }
            };

            let walker = Arc::clone(&self.walker);
            let event = Arc::clone(&event);
            let run_id = run.id;
            let handle = tokio::spawn(async move {
                if let Err(e) = walker.execute(&automation, &run, &event).await {
                    error!(run_id = %run.id, error = %e, "run outcome not recorded");
                }
            });
            handles.push((run_id, handle));
        }

        let mut run_ids = failed_ids;
        for (run_id, handle) in handles {
            // A task that died took its run with it; record the failure here.
            if let Err(join_err) = handle.await {
                let err = EngineError::DispatchIsolation(join_err.to_string());
                if let Err(e) = self.walker.fail_run(run_id, &err).await {
                    error!(%run_id, error = %e, "could not record aborted run");
                }
            }
            run_ids.push(run_id);
        }

        Ok(run_ids)
    }

    async fn fail_unreadable(
        &self,
        automation_id: Uuid,
        event: &DomainEvent,
        parse_err: EngineError,
    ) -> Result<Uuid, EngineError> {
        let run = self
            .walker
            .open_run(automation_id, &event.record_id, &event.event_type)
            .await?;
        let err = EngineError::MalformedGraph(parse_err.to_string());
        self.walker.fail_run(run.id, &err).await?;
        Ok(run.id)
    }

    /// Consume `events` until the stream closes or `shutdown` flips to true.
    /// Each event is dispatched on its own task so a slow automation never
    /// holds up the next event.
    pub async fn run(self: Arc<Self>, mut events: EventStream, mut shutdown: watch::Receiver<bool>) {
        info!("trigger dispatcher started");
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        info!("event stream closed");
                        break;
                    };
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = dispatcher.dispatch(event).await {
                            error!(error = %e, "event dispatch failed");
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("trigger dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Trigger subtype read straight from stored graph JSON.
fn raw_trigger_subtype(graph: &Value) -> Option<&str> {
    graph
        .get("nodes")?
        .as_array()?
        .iter()
        .find(|node| node.get("kind").and_then(Value::as_str) == Some("trigger"))?
        .get("subtype")?
        .as_str()
}
