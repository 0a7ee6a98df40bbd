use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use queue::DomainEvent;

use super::AppState;
use crate::error::{ApiError, ApiResult};

/// Accept a domain event from a CRM subsystem. Dispatch happens in the
/// background; the caller only learns the event was queued.
pub async fn emit(
    State(state): State<AppState>,
    Json(event): Json<DomainEvent>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let id = event.id;
    state
        .bus
        .try_emit(event)
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "eventId": id }))))
}
