//! Request handlers, one module per resource.

pub mod automations;
pub mod events;
pub mod runs;

pub use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}
