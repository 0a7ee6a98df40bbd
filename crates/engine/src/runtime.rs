//! `AutomationEngine` — the engine's components wired over one set of
//! stores and collaborators.

use std::sync::Arc;

use db::{AutomationStore, CursorStore, MemoryStore, RunStore};
use nodes::mock::InMemoryCrm;
use nodes::{ActionExecutor, Notifier, RecordGateway, TaskGateway};

use crate::dispatcher::TriggerDispatcher;
use crate::scheduler::ResumeScheduler;
use crate::service::AutomationService;
use crate::test_runner::TestRunner;
use crate::walker::GraphWalker;
use crate::EngineConfig;

/// Persistence the engine is written against.
#[derive(Clone)]
pub struct Stores {
    pub automations: Arc<dyn AutomationStore>,
    pub runs: Arc<dyn RunStore>,
    pub cursors: Arc<dyn CursorStore>,
}

impl Stores {
    /// All three stores backed by one implementation.
    pub fn single<S>(store: Arc<S>) -> Self
    where
        S: AutomationStore + RunStore + CursorStore + 'static,
    {
        Self {
            automations: store.clone(),
            runs: store.clone(),
            cursors: store,
        }
    }
}

/// The CRM subsystems actions write into.
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordGateway>,
    pub tasks: Arc<dyn TaskGateway>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn single<C>(crm: Arc<C>) -> Self
    where
        C: RecordGateway + TaskGateway + Notifier + 'static,
    {
        Self {
            records: crm.clone(),
            tasks: crm.clone(),
            notifier: crm,
        }
    }
}

pub struct AutomationEngine {
    pub service: AutomationService,
    pub walker: Arc<GraphWalker>,
    pub dispatcher: Arc<TriggerDispatcher>,
    pub scheduler: Arc<ResumeScheduler>,
    pub test_runner: TestRunner,
}

impl AutomationEngine {
    pub fn new(stores: Stores, crm: Collaborators, config: EngineConfig) -> Self {
        let actions = ActionExecutor::new(
            Arc::clone(&crm.records),
            crm.tasks,
            crm.notifier,
            stores.cursors,
        );
        let walker = Arc::new(GraphWalker::new(
            Arc::clone(&stores.automations),
            Arc::clone(&stores.runs),
            crm.records,
            actions,
            config,
        ));

        Self {
            service: AutomationService::new(Arc::clone(&stores.automations), Arc::clone(&stores.runs)),
            dispatcher: Arc::new(TriggerDispatcher::new(
                Arc::clone(&stores.automations),
                Arc::clone(&walker),
            )),
            scheduler: Arc::new(ResumeScheduler::new(stores.runs, Arc::clone(&walker))),
            test_runner: TestRunner::new(stores.automations, Arc::clone(&walker)),
            walker,
        }
    }

    /// Engine over [`MemoryStore`] and [`InMemoryCrm`].
    pub fn in_memory(store: Arc<MemoryStore>, crm: Arc<InMemoryCrm>, config: EngineConfig) -> Self {
        Self::new(Stores::single(store), Collaborators::single(crm), config)
    }
}
