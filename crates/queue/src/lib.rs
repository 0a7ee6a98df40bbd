//! `queue` crate — domain events and the in-process event bus.
//!
//! Mutation subsystems (records, tasks, tags) call [`EventBus::emit`]; the
//! engine's trigger dispatcher is the sole consumer of the matching
//! [`EventStream`]. Emitting never blocks and never fails the caller.

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{channel, EventBus, EventStream};
pub use error::QueueError;
pub use event::{event_types, DomainEvent};
