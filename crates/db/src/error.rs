//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A guarded state transition found the row in an unexpected state.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid stored value: {0}")]
    Corrupt(String),
}
