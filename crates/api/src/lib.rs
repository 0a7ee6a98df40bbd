//! `api` crate — HTTP surface of the automation engine.
//!
//! Exposes:
//!   POST   /api/v1/tenants/{tenant_id}/automations
//!   GET    /api/v1/tenants/{tenant_id}/automations
//!   GET    /api/v1/automations/{id}
//!   PATCH  /api/v1/automations/{id}
//!   DELETE /api/v1/automations/{id}
//!   GET    /api/v1/automations/{id}/runs?page=&perPage=
//!   POST   /api/v1/automations/{id}/test
//!   GET    /api/v1/runs/{id}
//!   POST   /api/v1/runs/{id}/cancel
//!   POST   /api/v1/events

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::AutomationEngine;
use queue::EventBus;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiErrorResponse, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AutomationEngine>,
    /// Where accepted domain events are queued for dispatch.
    pub bus: EventBus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/tenants/:tenant_id/automations",
            post(handlers::automations::create).get(handlers::automations::list),
        )
        .route(
            "/api/v1/automations/:id",
            get(handlers::automations::get)
                .patch(handlers::automations::update)
                .delete(handlers::automations::delete),
        )
        .route("/api/v1/automations/:id/runs", get(handlers::runs::list))
        .route("/api/v1/automations/:id/test", post(handlers::automations::test))
        .route("/api/v1/runs/:id", get(handlers::runs::get))
        .route("/api/v1/runs/:id/cancel", post(handlers::runs::cancel))
        .route("/api/v1/events", post(handlers::events::emit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}
