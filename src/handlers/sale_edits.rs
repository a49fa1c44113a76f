use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::sale_edit_request,
    services::sale_edits::{CreateEditRequest, DecideEditRequest},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateEditBody {
    pub tenant_id: Uuid,
    #[serde(flatten)]
    pub request: CreateEditRequest,
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateEditBody>,
) -> ApiResult<sale_edit_request::Model> {
    let created = state
        .services
        .sale_edits
        .create_request(body.tenant_id, body.request)
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<sale_edit_request::Model> {
    let request = state.services.sale_edits.get_request(id).await?;
    Ok(Json(ApiResponse::success(request)))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub tenant_id: Uuid,
}

pub async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Vec<sale_edit_request::Model>> {
    let pending = state.services.sale_edits.list_pending(query.tenant_id).await?;
    Ok(Json(ApiResponse::success(pending)))
}

pub async fn decide(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<DecideEditRequest>,
) -> ApiResult<sale_edit_request::Model> {
    let decided = state.services.sale_edits.decide(id, body).await?;
    Ok(Json(ApiResponse::success(decided)))
}
