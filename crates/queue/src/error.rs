//! Queue error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The consuming side of the bus has been dropped.
    #[error("event bus is closed; event {0} was dropped")]
    Closed(uuid::Uuid),
}
