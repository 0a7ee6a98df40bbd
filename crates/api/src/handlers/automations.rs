use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use db::models::ExecutionRunRow;
use engine::{Automation, CreateAutomation, UpdateAutomation};

use super::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunDto {
    pub record_id: String,
}

pub async fn list(
    Path(tenant_id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Automation>>> {
    Ok(Json(state.engine.service.list(tenant_id).await?))
}

pub async fn create(
    Path(tenant_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<CreateAutomation>,
) -> ApiResult<(StatusCode, Json<Automation>)> {
    let automation = state.engine.service.create(tenant_id, payload).await?;
    Ok((StatusCode::CREATED, Json(automation)))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<Automation>> {
    Ok(Json(state.engine.service.get(id).await?))
}

/// Builder save: partial update, validated when a graph is sent or the
/// automation is switched on.
pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<UpdateAutomation>,
) -> ApiResult<Json<Automation>> {
    Ok(Json(state.engine.service.update(id, payload).await?))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<StatusCode> {
    state.engine.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Run the automation once against a record, active or not.
pub async fn test(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<TestRunDto>,
) -> ApiResult<Json<ExecutionRunRow>> {
    Ok(Json(state.engine.test_runner.test(id, &payload.record_id).await?))
}
