//! Action-level error type.

use thiserror::Error;

/// Why an action could not be applied.
///
/// Every variant terminates the current run only; there is no automatic
/// retry, and effects already committed earlier in the run stay in place.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action references an entity that has been deleted.
    #[error("{entity} '{id}' no longer exists")]
    MissingEntity { entity: &'static str, id: String },

    /// The collaborator rejected or failed the write.
    #[error("external write failed: {0}")]
    WriteFailed(String),

    /// The node's configuration can't be executed.
    #[error("invalid action config: {0}")]
    InvalidConfig(String),

    #[error("round-robin cursor unavailable: {0}")]
    Cursor(#[from] db::DbError),
}

impl ActionError {
    pub fn missing(entity: &'static str, id: impl Into<String>) -> Self {
        Self::MissingEntity { entity, id: id.into() }
    }
}
