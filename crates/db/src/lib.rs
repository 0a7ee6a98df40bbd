//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, the store traits the engine
//! is written against, and two implementations of them: Postgres
//! ([`PgStore`], backed by the repository functions) and in-memory
//! ([`MemoryStore`], for tests and single-process use). No business logic
//! lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use pool::{DbConfig, DbPool};
pub use store::{AutomationStore, CursorStore, RunStore};
