use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::models::{ExecutionRunRow, Page};

use super::AppState;
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        let default = Page::default();
        Page::new(q.page.unwrap_or(default.page), q.per_page.unwrap_or(default.per_page))
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Run log of one automation, newest first.
pub async fn list(
    Path(automation_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ExecutionRunRow>>> {
    Ok(Json(state.engine.service.runs(automation_id, query.into()).await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<ExecutionRunRow>> {
    Ok(Json(state.engine.service.run(id).await?))
}

/// Stop a suspended run before it resumes. `cancelled: false` when the run
/// was not suspended.
pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<CancelResponse>> {
    let cancelled = state.engine.service.cancel_run(id).await?;
    Ok(Json(CancelResponse { cancelled }))
}
