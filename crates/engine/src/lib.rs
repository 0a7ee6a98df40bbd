//! `engine` crate — graph model, validation, condition evaluation and the
//! run machinery (walker, trigger dispatcher, resume scheduler, test runner).

pub mod condition;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod test_runner;
pub mod validate;
pub mod walker;

pub use config::EngineConfig;
pub use dispatcher::{Candidates, TriggerDispatcher};
pub use error::EngineError;
pub use models::{Automation, Edge, NodeKind, TriggerSpec, WorkflowGraph, WorkflowNode};
pub use runtime::{AutomationEngine, Collaborators, Stores};
pub use scheduler::ResumeScheduler;
pub use service::{AutomationService, CreateAutomation, UpdateAutomation};
pub use test_runner::TestRunner;
pub use validate::validate_graph;
pub use walker::{GraphWalker, ResumeState, MANUAL_TEST};

#[cfg(test)]
mod walker_tests;
