//! `nodes` crate — action configs, the collaborator contracts actions write
//! into, and the [`ActionExecutor`] that applies one action node.
//!
//! [`mock::InMemoryCrm`] implements every collaborator in memory; tests and
//! the single-process binary use it in place of the real CRM services.

pub mod action;
pub mod error;
pub mod executor;
pub mod mock;
pub mod record;
pub mod traits;

pub use action::{ActionConfig, TaskAssignee, TaskTemplate, WaitDuration, WaitUnit};
pub use error::ActionError;
pub use executor::{ActionExecutor, ActionOutcome};
pub use record::{RecordSnapshot, Temperature};
pub use traits::{
    ActionContext, NewTask, Notification, Notifier, RecordGateway, RecordMutation, TaskGateway,
};
